//! Execution mode for the trading stack.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// How orders are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    /// Fills are synthesized locally from the latest cached close.
    #[default]
    Local,
    /// Orders go to the broker sandbox.
    Paper,
    /// Live trading.
    Real,
}

impl TradeMode {
    /// Subscriptions are frozen whenever a broker account is involved.
    pub fn freeze_subscriptions(&self) -> bool {
        !matches!(self, Self::Local)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Paper => write!(f, "paper"),
            Self::Real => write!(f, "real"),
        }
    }
}

impl FromStr for TradeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "paper" => Ok(Self::Paper),
            "real" => Ok(Self::Real),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown trade mode: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_subscriptions() {
        assert!(!TradeMode::Local.freeze_subscriptions());
        assert!(TradeMode::Paper.freeze_subscriptions());
        assert!(TradeMode::Real.freeze_subscriptions());
    }

    #[test]
    fn test_parse() {
        assert_eq!("PAPER".parse::<TradeMode>().unwrap(), TradeMode::Paper);
        assert!("sandbox".parse::<TradeMode>().is_err());
    }
}
