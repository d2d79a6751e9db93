//! Streaming market/trades client.
//!
//! `TradingMarket` presents a synchronous API while all network I/O (two
//! WebSocket channels plus a rate-limited REST session) runs on a dedicated
//! runtime thread. Synchronous callers bridge onto that runtime through
//! `IoRuntime::block_on_remote` and read shared caches under one coarse
//! lock.

pub mod bucket;
pub mod cache;
pub mod channel;
pub mod client;
pub mod error;
pub mod parser;
pub mod rest;
pub mod runtime;

pub use bucket::TokenBucket;
pub use cache::{AccountCache, MarketCaches, OrderUpdate};
pub use client::TradingMarket;
pub use error::{MarketError, MarketResult};
pub use parser::TradeUpdate;
pub use rest::{BarFetcher, RestTransport};
pub use runtime::IoRuntime;
