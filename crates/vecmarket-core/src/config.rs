//! Broker endpoint and credential configuration.
//!
//! `BrokerConfig` is an immutable bundle validated at construction. Blank
//! endpoints are filled from the per-broker default table; the data REST
//! base for Alpaca additionally depends on the asset class.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::mode::TradeMode;

/// Supported brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Broker {
    Alpaca,
    Binance,
    Ibkr,
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpaca => write!(f, "alpaca"),
            Self::Binance => write!(f, "binance"),
            Self::Ibkr => write!(f, "ibkr"),
        }
    }
}

impl FromStr for Broker {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alpaca" => Ok(Self::Alpaca),
            "binance" => Ok(Self::Binance),
            "ibkr" => Ok(Self::Ibkr),
            other => Err(CoreError::InvalidConfig(format!("unknown broker: {other}"))),
        }
    }
}

/// Per-broker endpoint defaults, applied to blank fields at construction.
struct EndpointDefaults {
    market_ws_url: &'static str,
    trades_ws_url: &'static str,
    paper_rest_base: &'static str,
    live_rest_base: &'static str,
    data_rest_base: Option<&'static str>,
}

fn endpoint_defaults(broker: Broker) -> EndpointDefaults {
    match broker {
        Broker::Alpaca => EndpointDefaults {
            market_ws_url: "wss://stream.data.alpaca.markets/v2/iex",
            trades_ws_url: "wss://paper-api.alpaca.markets/stream",
            paper_rest_base: "https://paper-api.alpaca.markets/v2",
            live_rest_base: "https://api.alpaca.markets/v2",
            // Depends on asset class; derived below.
            data_rest_base: None,
        },
        Broker::Binance => EndpointDefaults {
            market_ws_url: "wss://stream.binance.com:9443/ws",
            trades_ws_url: "wss://stream.binance.com:9443/ws",
            paper_rest_base: "https://testnet.binance.vision/api",
            live_rest_base: "https://api.binance.com/api",
            data_rest_base: Some("https://api.binance.com/api"),
        },
        Broker::Ibkr => EndpointDefaults {
            market_ws_url: "wss://your-ibkr-ws",
            trades_ws_url: "wss://your-ibkr-trades",
            paper_rest_base: "https://your-ibkr-paper-rest",
            live_rest_base: "https://your-ibkr-live-rest",
            data_rest_base: None,
        },
    }
}

const ALPACA_DATA_STOCKS: &str = "https://data.alpaca.markets/v2/stocks";
const ALPACA_DATA_CRYPTO: &str = "https://data.alpaca.markets/v1beta3/crypto/us";

/// Immutable endpoint/credential bundle for one broker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub broker: Broker,
    pub api_key: String,
    pub secret_key: String,
    pub trade_mode: TradeMode,

    // Asset identity used in the observation's asset_id encoding.
    pub country_code: String,
    pub exchange_code: String,
    pub asset_type: String,

    // Endpoints; blanks are filled from the per-broker default table.
    pub market_ws_url: String,
    pub trades_ws_url: String,
    pub paper_rest_base: String,
    pub live_rest_base: String,
    pub data_rest_base: String,

    // Rate limits / timeouts.
    pub recv_timeout_sec: f64,
    pub rest_rps: f64,
    pub rest_burst: u32,
    pub ws_pull_rps: f64,
    pub ws_pull_burst: u32,

    /// Timeframe for REST bar backfill (e.g. "1Min").
    pub bars_timeframe: String,
}

impl BrokerConfig {
    /// Build a config with default endpoints, identity, and limits.
    ///
    /// Fails when the api key or secret is empty.
    pub fn new(
        broker: Broker,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> CoreResult<Self> {
        let api_key = api_key.into();
        let secret_key = secret_key.into();
        if api_key.is_empty() {
            return Err(CoreError::InvalidConfig("api_key is required".to_string()));
        }
        if secret_key.is_empty() {
            return Err(CoreError::InvalidConfig(
                "secret_key is required".to_string(),
            ));
        }

        let mut cfg = Self {
            broker,
            api_key,
            secret_key,
            trade_mode: TradeMode::Local,
            country_code: "US".to_string(),
            exchange_code: "XNYS".to_string(),
            asset_type: "ESXXXX".to_string(),
            market_ws_url: String::new(),
            trades_ws_url: String::new(),
            paper_rest_base: String::new(),
            live_rest_base: String::new(),
            data_rest_base: String::new(),
            recv_timeout_sec: 1.0,
            rest_rps: 5.0,
            rest_burst: 10,
            ws_pull_rps: 20.0,
            ws_pull_burst: 50,
            bars_timeframe: "1Min".to_string(),
        };
        cfg.fill_endpoint_defaults();
        Ok(cfg)
    }

    /// Set the trade mode.
    pub fn with_trade_mode(mut self, mode: TradeMode) -> Self {
        self.trade_mode = mode;
        self
    }

    /// Set the asset identity codes. For Alpaca this re-derives the data
    /// REST base from the asset class; apply `with_data_rest_base` after
    /// this to override it.
    pub fn with_asset_identity(
        mut self,
        country_code: impl Into<String>,
        exchange_code: impl Into<String>,
        asset_type: impl Into<String>,
    ) -> Self {
        self.country_code = country_code.into();
        self.exchange_code = exchange_code.into();
        self.asset_type = asset_type.into();
        if self.broker == Broker::Alpaca {
            self.data_rest_base = self.derived_alpaca_data_base().to_string();
        }
        self
    }

    /// Override the market-data WS endpoint.
    pub fn with_market_ws_url(mut self, url: impl Into<String>) -> Self {
        self.market_ws_url = url.into();
        self
    }

    /// Override the trades/account WS endpoint.
    pub fn with_trades_ws_url(mut self, url: impl Into<String>) -> Self {
        self.trades_ws_url = url.into();
        self
    }

    /// Override both trading REST bases at once (paper and live).
    pub fn with_rest_bases(mut self, paper: impl Into<String>, live: impl Into<String>) -> Self {
        self.paper_rest_base = paper.into();
        self.live_rest_base = live.into();
        self
    }

    /// Override the data REST base.
    pub fn with_data_rest_base(mut self, base: impl Into<String>) -> Self {
        self.data_rest_base = base.into();
        self
    }

    /// Trading REST base for the configured mode (paper vs live).
    pub fn rest_base(&self) -> &str {
        match self.trade_mode {
            TradeMode::Paper => &self.paper_rest_base,
            // Local mode has no broker account; the live base is only used
            // as a generic fallback for data paths.
            TradeMode::Local | TradeMode::Real => &self.live_rest_base,
        }
    }

    /// Whether the configured asset class is a crypto market.
    pub fn is_crypto(&self) -> bool {
        self.asset_type.to_ascii_lowercase().starts_with("crypto")
    }

    fn derived_alpaca_data_base(&self) -> &'static str {
        if self.is_crypto() {
            ALPACA_DATA_CRYPTO
        } else {
            ALPACA_DATA_STOCKS
        }
    }

    fn fill_endpoint_defaults(&mut self) {
        let defaults = endpoint_defaults(self.broker);
        if self.market_ws_url.is_empty() {
            self.market_ws_url = defaults.market_ws_url.to_string();
        }
        if self.trades_ws_url.is_empty() {
            self.trades_ws_url = defaults.trades_ws_url.to_string();
        }
        if self.paper_rest_base.is_empty() {
            self.paper_rest_base = defaults.paper_rest_base.to_string();
        }
        if self.live_rest_base.is_empty() {
            self.live_rest_base = defaults.live_rest_base.to_string();
        }
        if self.data_rest_base.is_empty() {
            self.data_rest_base = match defaults.data_rest_base {
                Some(base) => base.to_string(),
                None if self.broker == Broker::Alpaca => {
                    self.derived_alpaca_data_base().to_string()
                }
                // Fall back to the trading base for brokers without a
                // dedicated data API.
                None => self.rest_base().to_string(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_endpoints_filled() {
        let cfg = BrokerConfig::new(Broker::Alpaca, "key", "secret").unwrap();
        assert_eq!(cfg.market_ws_url, "wss://stream.data.alpaca.markets/v2/iex");
        assert_eq!(cfg.paper_rest_base, "https://paper-api.alpaca.markets/v2");
        assert_eq!(cfg.data_rest_base, ALPACA_DATA_STOCKS);
    }

    #[test]
    fn test_alpaca_crypto_data_base() {
        let cfg = BrokerConfig::new(Broker::Alpaca, "key", "secret")
            .unwrap()
            .with_asset_identity("US", "XCEC", "Crypto/Spot");
        assert!(cfg.is_crypto());
        assert_eq!(cfg.data_rest_base, ALPACA_DATA_CRYPTO);
    }

    #[test]
    fn test_binance_data_base() {
        let cfg = BrokerConfig::new(Broker::Binance, "key", "secret").unwrap();
        assert_eq!(cfg.data_rest_base, "https://api.binance.com/api");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(BrokerConfig::new(Broker::Alpaca, "", "secret").is_err());
        assert!(BrokerConfig::new(Broker::Alpaca, "key", "").is_err());
    }

    #[test]
    fn test_rest_base_tracks_mode() {
        let cfg = BrokerConfig::new(Broker::Alpaca, "key", "secret")
            .unwrap()
            .with_trade_mode(TradeMode::Paper);
        assert_eq!(cfg.rest_base(), "https://paper-api.alpaca.markets/v2");

        let cfg = cfg.with_trade_mode(TradeMode::Real);
        assert_eq!(cfg.rest_base(), "https://api.alpaca.markets/v2");
    }

    #[test]
    fn test_explicit_override_survives() {
        let cfg = BrokerConfig::new(Broker::Alpaca, "key", "secret")
            .unwrap()
            .with_data_rest_base("http://127.0.0.1:9999");
        assert_eq!(cfg.data_rest_base, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_rate_limit_defaults() {
        let cfg = BrokerConfig::new(Broker::Alpaca, "key", "secret").unwrap();
        assert_eq!(cfg.rest_rps, 5.0);
        assert_eq!(cfg.rest_burst, 10);
        assert_eq!(cfg.ws_pull_rps, 20.0);
        assert_eq!(cfg.ws_pull_burst, 50);
    }
}
