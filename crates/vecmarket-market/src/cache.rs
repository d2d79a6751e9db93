//! Shared caches behind one coarse lock.
//!
//! The channel loops (I/O runtime side) and synchronous snapshot readers
//! both go through `Mutex<MarketCaches>`; per-symbol update order is total
//! because each cache has exactly one writing loop.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use vecmarket_core::Bar;

/// Last-seen order payload, keyed by order id in `MarketCaches::orders`.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub id: String,
    pub symbol: Option<String>,
    pub status: Option<String>,
    pub filled_avg_price: Option<f64>,
}

/// Account-level state merged from the trades stream and REST rollups.
#[derive(Debug, Default)]
pub struct AccountCache {
    /// Raw field map from `/account` responses and account-update frames.
    pub fields: HashMap<String, Value>,
    /// Previous NAV per symbol, used for reward differentials in
    /// paper/real modes.
    pub nav_prev_by_sym: HashMap<String, f64>,
}

impl AccountCache {
    /// Merge a payload's fields into the cache.
    pub fn merge(&mut self, payload: &serde_json::Map<String, Value>) {
        for (key, value) in payload {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Numeric read of a field; brokers send numbers as strings as often
    /// as not.
    pub fn field_f64(&self, key: &str) -> f64 {
        self.fields.get(key).map(json_f64).unwrap_or(0.0)
    }
}

/// All mutable client state shared between the I/O runtime and
/// synchronous callers.
#[derive(Default)]
pub struct MarketCaches {
    /// Latest bar per symbol.
    pub bars: HashMap<String, Bar>,
    /// Account fields plus per-symbol NAV history.
    pub account: AccountCache,
    /// Last-seen payload per order id.
    pub orders: HashMap<String, OrderUpdate>,
    /// Symbols currently announced to the market WS.
    pub subscribed: HashSet<String>,
}

impl MarketCaches {
    /// Latest close for a symbol, zero when absent or stale.
    pub fn close(&self, symbol: &str) -> f64 {
        self.bars.get(symbol).map(|b| b.c as f64).unwrap_or(0.0)
    }
}

/// Read a JSON value as f64, accepting numbers and numeric strings.
pub fn json_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Read a JSON value as an owned string when present.
pub fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
