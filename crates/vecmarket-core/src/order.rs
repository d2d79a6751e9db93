//! Per-lane order flow records.
//!
//! Order submission returns one `OrderResult` per lane; lanes that never
//! produced an order are marked skipped with a reason rather than omitted,
//! so the result array always has the same length as the request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of columns in an account feature row:
/// `[position_qty, cash, avg_entry_price, unrealized_pnl, exposure, asset_nav]`.
pub const ACCOUNT_FEATURE_COLS: usize = 6;

/// Per-lane action: 0 = hold, 1 = buy, 2 = sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Hold,
    Buy,
    Sell,
}

impl Action {
    /// Decode a raw action index; anything out of range is a hold.
    pub fn from_index(idx: i64) -> Self {
        match idx {
            1 => Self::Buy,
            2 => Self::Sell,
            _ => Self::Hold,
        }
    }

    pub fn index(&self) -> i64 {
        match self {
            Self::Hold => 0,
            Self::Buy => 1,
            Self::Sell => 2,
        }
    }

    /// Side string used in broker order payloads.
    pub fn as_side(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_side())
    }
}

/// Why a lane produced no order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Symbol is not in the current subscription set.
    NotSubscribed,
    /// Symbol already handled by an earlier lane in the same call.
    DuplicateLane,
    /// Submission raised a transport-level error.
    Error,
    /// Lane was never populated by the submission pass.
    NoOrder,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubscribed => write!(f, "not_subscribed"),
            Self::DuplicateLane => write!(f, "duplicate_lane"),
            Self::Error => write!(f, "error"),
            Self::NoOrder => write!(f, "no_order"),
        }
    }
}

/// Outcome of one lane of `submit_orders`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderResult {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Average fill price; 0.0 when unknown or skipped.
    #[serde(default)]
    pub filled_avg_price: f64,
    /// Action that produced this result (hold when unspecified).
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderResult {
    /// A lane that produced no order.
    pub fn skipped(symbol: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            symbol: symbol.into(),
            skipped: true,
            reason: Some(reason),
            ..Self::default()
        }
    }

    /// A lane whose submission failed with a transport error.
    pub fn errored(symbol: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            skipped: true,
            reason: Some(SkipReason::Error),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A locally synthesized fill at the latest cached close.
    pub fn local_fill(
        symbol: impl Into<String>,
        order_id: String,
        price: f64,
        action: Action,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            order_id: Some(order_id),
            status: Some("filled".to_string()),
            filled_avg_price: price,
            action,
            ..Self::default()
        }
    }

    /// A broker-accepted (or synthetically tagged) order id.
    pub fn accepted(symbol: impl Into<String>, order_id: String) -> Self {
        Self {
            symbol: symbol.into(),
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    /// Lane participates in account rollups iff it was not skipped.
    pub fn is_active(&self) -> bool {
        !self.skipped
    }
}

/// Market-order payload for `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPayload {
    pub symbol: String,
    pub qty: i64,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
}

impl OrderPayload {
    /// Day market order, the only shape this client submits.
    pub fn market_day(symbol: impl Into<String>, qty: i64, side: Action) -> Self {
        Self {
            symbol: symbol.into(),
            qty,
            side: side.as_side().to_string(),
            order_type: "market".to_string(),
            time_in_force: "day".to_string(),
        }
    }
}
