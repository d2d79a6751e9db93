//! Core domain types for the vectorized trading environment.
//!
//! This crate provides the fundamental types shared by the market client,
//! the local fill simulator, and the vectorized environment:
//! - `TradeMode`: execution mode (local simulation, paper, real)
//! - `Bar`: latest OHLCV tick per symbol with a fractional-day timestamp
//! - `Action`, `OrderResult`: per-lane order flow records
//! - `BrokerConfig`: endpoint/credential bundle with per-broker defaults
//! - asset registry: static (country, exchange, asset-type, symbol) id maps

pub mod bar;
pub mod config;
pub mod error;
pub mod mode;
pub mod order;
pub mod registry;
pub mod sanitize;

pub use bar::{frac_days_now, Bar, MARKET_FEATURE_COLS};
pub use config::{Broker, BrokerConfig};
pub use error::{CoreError, CoreResult};
pub use mode::TradeMode;
pub use order::{Action, OrderPayload, OrderResult, SkipReason, ACCOUNT_FEATURE_COLS};
pub use registry::{
    asset_type_id, country_id, exchange_id, symbol_id, NUM_ASSET_TYPES, NUM_COUNTRIES,
    NUM_EXCHANGES, NUM_LOCAL_SYMBOLS, PRIMARY_CRYPTO_SYMBOLS, PRIMARY_STOCK_SYMBOLS,
};
pub use sanitize::sanitize_rows;
