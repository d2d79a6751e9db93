//! Observation layout and feature assembly.

use vecmarket_core::{
    ACCOUNT_FEATURE_COLS, MARKET_FEATURE_COLS, NUM_ASSET_TYPES, NUM_COUNTRIES, NUM_EXCHANGES,
    NUM_LOCAL_SYMBOLS,
};

/// Market feature columns exposed in the observation (`[o, h, l, c, v]`;
/// the timestamp feeds the time features instead).
pub const OBS_MARKET_COLS: usize = 5;
/// sin/cos pairs over the calendar periods {1, 7, 12, 4, 365}.
pub const TIME_FEATURE_COLS: usize = 10;

const TIME_PERIODS: [f64; 5] = [1.0, 7.0, 12.0, 4.0, 365.0];

/// One structured observation over all lanes.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// `[country, exchange, asset_type, local_symbol]` per lane.
    pub asset_id: Vec<[u32; 4]>,
    pub market_features: Vec<[f32; OBS_MARKET_COLS]>,
    pub account_features: Vec<[f32; ACCOUNT_FEATURE_COLS]>,
    pub time_features: Vec<[f32; TIME_FEATURE_COLS]>,
}

/// Shape/bounds description of the observation dict, for RL runners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationSpace {
    /// MultiDiscrete bounds of one asset-id row.
    pub asset_id_nvec: [u32; 4],
    pub market_shape: (usize, usize),
    pub account_shape: (usize, usize),
    pub time_shape: (usize, usize),
}

impl ObservationSpace {
    pub fn for_lanes(num_envs: usize) -> Self {
        Self {
            asset_id_nvec: [
                NUM_COUNTRIES,
                NUM_EXCHANGES,
                NUM_ASSET_TYPES,
                NUM_LOCAL_SYMBOLS,
            ],
            market_shape: (num_envs, OBS_MARKET_COLS),
            account_shape: (num_envs, ACCOUNT_FEATURE_COLS),
            time_shape: (num_envs, TIME_FEATURE_COLS),
        }
    }
}

/// Per-lane discrete action bounds: `[3] * num_envs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    pub nvec: Vec<u32>,
}

impl ActionSpace {
    pub fn for_lanes(num_envs: usize) -> Self {
        Self {
            nvec: vec![3; num_envs],
        }
    }

    pub fn contains(&self, actions: &[i64]) -> bool {
        actions.len() == self.nvec.len() && actions.iter().all(|&a| (0..3).contains(&a))
    }
}

/// Cyclical time encoding of the fractional-day timestamp column.
///
/// For each period p, emits `[sin(2π(t mod p)/p), cos(2π(t mod p)/p)]`.
pub fn build_time_features(
    market_rows: &[[f32; MARKET_FEATURE_COLS]],
) -> Vec<[f32; TIME_FEATURE_COLS]> {
    market_rows
        .iter()
        .map(|row| {
            let t = row[5] as f64;
            let mut out = [0.0f32; TIME_FEATURE_COLS];
            for (k, p) in TIME_PERIODS.iter().enumerate() {
                let phase = 2.0 * std::f64::consts::PI * (t % p) / p;
                out[2 * k] = phase.sin() as f32;
                out[2 * k + 1] = phase.cos() as f32;
            }
            out
        })
        .collect()
}
