//! Error types for vecmarket-env.

use thiserror::Error;

/// Environment errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Account(#[from] vecmarket_account::AccountError),

    #[error("Cannot build a vector env without seed symbols")]
    NoSeedSymbols,

    #[error("Expected {expected} actions, got {got}")]
    ActionShape { expected: usize, got: usize },
}

/// Result type alias for environment operations.
pub type EnvResult<T> = std::result::Result<T, EnvError>;
