//! Error types for vecmarket-market.

use thiserror::Error;

/// Market client errors.
///
/// Only construction-time failures surface to callers; recoverable
/// transport errors are absorbed at the channel/REST boundary.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Config(#[from] vecmarket_core::CoreError),

    #[error("Failed to start I/O runtime: {0}")]
    RuntimeStart(String),

    #[error("block_on_remote called from within the I/O runtime")]
    ReentrantBlockOn,

    #[error("I/O runtime dropped the request")]
    BridgeClosed,

    #[error("Bridged call timed out")]
    BridgeTimeout,

    #[error("WebSocket connect to {url} failed: {source}")]
    WsConnect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("HTTP client build failed: {0}")]
    HttpClient(String),
}

/// Result type alias for market operations.
pub type MarketResult<T> = std::result::Result<T, MarketError>;
