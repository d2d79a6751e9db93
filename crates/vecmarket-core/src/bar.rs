//! Latest-bar market tick.

use serde::{Deserialize, Serialize};

/// Number of columns in a market feature row: `[o, h, l, c, v, t]`.
pub const MARKET_FEATURE_COLS: usize = 6;

/// A single OHLCV tick for one symbol.
///
/// `t` is a fractional-day timestamp (seconds since the epoch divided by
/// 86400). A cache entry exists iff at least one WS or REST update was
/// applied; a zero close marks the entry as stale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bar {
    pub o: f32,
    pub h: f32,
    pub l: f32,
    pub c: f32,
    pub v: f32,
    pub t: f64,
}

impl Bar {
    /// A zero-close bar is treated as not-yet-populated.
    pub fn is_stale(&self) -> bool {
        self.c == 0.0
    }

    /// Feature row `[o, h, l, c, v, t]` for observation assembly.
    pub fn to_row(&self) -> [f32; MARKET_FEATURE_COLS] {
        [self.o, self.h, self.l, self.c, self.v, self.t as f32]
    }
}

/// Current wall-clock time in fractional days.
pub fn frac_days_now() -> f64 {
    let now = chrono::Utc::now();
    let micros = now.timestamp_micros();
    micros as f64 / 1e6 / 86_400.0
}
