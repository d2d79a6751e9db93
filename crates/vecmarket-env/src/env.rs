//! The vectorized environment.

use std::time::Duration;

use tracing::{debug, warn};

use vecmarket_account::{LaneRanges, LocalAccount};
use vecmarket_core::{sanitize::sanitize_vec, sanitize_rows, Action, OrderResult, TradeMode};
use vecmarket_market::TradingMarket;

use crate::error::{EnvError, EnvResult};
use crate::obs::{build_time_features, ActionSpace, Observation, ObservationSpace};

/// Snapshot wait bound when assembling observations.
const MARKET_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one vectorized step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
}

/// Vectorized trading environment over `num_envs` symbol lanes.
///
/// Owns its market client and, in local mode, a `LocalAccount` fill
/// simulator. All calls are synchronous; auto-reset happens inside `step`
/// so callers never reset individual lanes.
pub struct TradingVecEnv {
    market: TradingMarket,
    local_account: Option<LocalAccount>,
    trade_mode: TradeMode,
    num_envs: usize,
    init_symbols: Vec<String>,
    symbols: Vec<String>,
    step_count: i64,
}

impl TradingVecEnv {
    /// Bind a market client and allocate the symbol lanes by taking the
    /// first `num_envs` seed symbols, cycling when the seed list is
    /// shorter.
    pub fn new(num_envs: usize, market: TradingMarket, ranges: LaneRanges) -> EnvResult<Self> {
        let init_symbols: Vec<String> = market.init_symbols().to_vec();
        if init_symbols.is_empty() {
            return Err(EnvError::NoSeedSymbols);
        }
        let symbols: Vec<String> = init_symbols.iter().cloned().cycle().take(num_envs).collect();

        let trade_mode = market.trade_mode();
        let local_account = if trade_mode.is_local() {
            Some(LocalAccount::new(num_envs, ranges)?)
        } else {
            None
        };

        Ok(Self {
            market,
            local_account,
            trade_mode,
            num_envs,
            init_symbols,
            symbols,
            step_count: 0,
        })
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    pub fn trade_mode(&self) -> TradeMode {
        self.trade_mode
    }

    /// Current lane symbols.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn market(&self) -> &TradingMarket {
        &self.market
    }

    pub fn local_account(&self) -> Option<&LocalAccount> {
        self.local_account.as_ref()
    }

    pub fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::for_lanes(self.num_envs)
    }

    pub fn action_space(&self) -> ActionSpace {
        ActionSpace::for_lanes(self.num_envs)
    }

    /// Start a fresh episode. In local mode the lane state is re-drawn and
    /// subscriptions are reconciled to the fresh symbols (best-effort).
    pub fn reset(&mut self, seed: Option<u64>) -> EnvResult<Observation> {
        self.step_count = 0;

        if let Some(account) = self.local_account.as_mut() {
            if let Some(seed) = seed {
                account.reseed(seed);
            }
            self.symbols = account.reset_account(&self.init_symbols, None)?;
            self.market.reset_subscriptions(&self.symbols);
        }

        Ok(self.build_observation())
    }

    /// Advance all lanes by one action vector.
    pub fn step(&mut self, actions: &[i64]) -> EnvResult<StepResult> {
        if actions.len() != self.num_envs {
            return Err(EnvError::ActionShape {
                expected: self.num_envs,
                got: actions.len(),
            });
        }
        self.step_count += 1;

        let sides: Vec<Action> = actions.iter().map(|&a| Action::from_index(a)).collect();
        let qtys = vec![1i64; self.num_envs];

        let order_results =
            self.market
                .submit_orders(&self.symbols, &sides, &qtys, self.trade_mode);

        let (mut reward, truncated, terminated) = self.step_account(&order_results);

        // The observation reflects the post-trade, pre-reset state.
        let mut observation = self.build_observation();
        sanitize_rows(&mut observation.market_features);
        sanitize_rows(&mut observation.account_features);
        sanitize_rows(&mut observation.time_features);
        sanitize_vec(&mut reward);

        // Vector auto-reset (local only): re-draw done lanes, reconcile
        // subscriptions, and realign their NAV baseline so the next reward
        // does not spike.
        if let Some(account) = self.local_account.as_mut() {
            let done_indices: Vec<usize> = truncated
                .iter()
                .zip(&terminated)
                .enumerate()
                .filter(|(_, (tr, te))| **tr || **te)
                .map(|(i, _)| i)
                .collect();
            if !done_indices.is_empty() {
                debug!(lanes = done_indices.len(), "auto-resetting done lanes");
                let fresh = account.reset_account(&self.init_symbols, Some(&done_indices))?;
                for (slot, symbol) in done_indices.iter().zip(fresh) {
                    self.symbols[*slot] = symbol;
                }
                self.market.reset_subscriptions(&self.symbols);

                let done_symbols: Vec<String> = done_indices
                    .iter()
                    .map(|&i| self.symbols[i].clone())
                    .collect();
                let rows = self
                    .market
                    .get_market_features(&done_symbols, MARKET_SNAPSHOT_TIMEOUT);
                account.update_account(&rows, &done_indices)?;
            }
        }

        Ok(StepResult {
            observation,
            reward,
            terminated,
            truncated,
        })
    }

    /// Release broker resources. Local mode keeps the shared client alive
    /// for other consumers and only drops the simulator with the env.
    pub fn close(&mut self) {
        if !self.trade_mode.is_local() {
            self.market.close();
        }
    }

    fn step_account(&mut self, order_results: &[OrderResult]) -> (Vec<f32>, Vec<bool>, Vec<bool>) {
        match self.local_account.as_mut() {
            Some(account) => account.step_account(order_results, self.step_count),
            None => self.market.step_account(order_results, Some(&self.symbols)),
        }
    }

    fn build_observation(&self) -> Observation {
        let account_features = match self.local_account.as_ref() {
            Some(account) => account.get_account_features(&self.symbols),
            None => self.market.get_account_features(&self.symbols),
        };
        let market_rows = self
            .market
            .get_market_features(&self.symbols, MARKET_SNAPSHOT_TIMEOUT);
        if market_rows.len() != self.num_envs {
            warn!(
                rows = market_rows.len(),
                lanes = self.num_envs,
                "market snapshot shape mismatch"
            );
        }

        let country = self.market.country_id();
        let exchange = self.market.exchange_id();
        let asset_type = self.market.asset_type_id();
        let asset_id: Vec<[u32; 4]> = (0..self.num_envs)
            .map(|i| [country, exchange, asset_type, i as u32 + 1])
            .collect();

        let market_features = market_rows
            .iter()
            .map(|row| [row[0], row[1], row[2], row[3], row[4]])
            .collect();
        let time_features = build_time_features(&market_rows);

        Observation {
            asset_id,
            market_features,
            account_features,
            time_features,
        }
    }
}
