//! Error types for vecmarket-account.

use thiserror::Error;

/// Account simulator errors.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid range for {name}: low {low} > high {high}")]
    InvalidRange {
        name: &'static str,
        low: f64,
        high: f64,
    },

    #[error("Lane index {index} out of bounds for {lanes} lanes")]
    LaneOutOfBounds { index: usize, lanes: usize },

    #[error("Expected {expected} feature rows, got {got}")]
    FeatureShape { expected: usize, got: usize },
}

/// Result type alias for account operations.
pub type AccountResult<T> = std::result::Result<T, AccountError>;
