//! Synchronous vectorized trading environment.
//!
//! `TradingVecEnv` composes market and account snapshots into a structured
//! observation, routes actions through the market client, computes per-lane
//! rewards, and enforces vector auto-reset semantics in local mode.

pub mod env;
pub mod error;
pub mod obs;

pub use env::{StepResult, TradingVecEnv};
pub use error::{EnvError, EnvResult};
pub use obs::{
    build_time_features, ActionSpace, Observation, ObservationSpace, TIME_FEATURE_COLS,
};
