//! Lane-array portfolio simulator for local trade mode.
//!
//! `LocalAccount` keeps per-lane cash, position, and NAV state as
//! contiguous arrays and applies simulated fills elementwise. It is owned
//! by the environment and never touched by the I/O runtime.

pub mod account;
pub mod error;

pub use account::{LaneRanges, LocalAccount};
pub use error::{AccountError, AccountResult};
