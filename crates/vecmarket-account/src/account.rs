//! Per-lane portfolio state and simulated fill rules.

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use vecmarket_core::{Action, OrderResult, ACCOUNT_FEATURE_COLS, MARKET_FEATURE_COLS};

use crate::error::{AccountError, AccountResult};

/// Sampling ranges used when (re)seeding lanes.
#[derive(Debug, Clone)]
pub struct LaneRanges {
    /// Initial position quantity, inclusive.
    pub num_stocks: (i64, i64),
    /// Initial cash budget, inclusive.
    pub budget: (f64, f64),
    /// Episode length bound, inclusive.
    pub max_steps: (i64, i64),
}

impl Default for LaneRanges {
    fn default() -> Self {
        Self {
            num_stocks: (0, 100),
            budget: (100.0, 10_000.0),
            max_steps: (1_000, 10_000),
        }
    }
}

impl LaneRanges {
    fn validate(&self) -> AccountResult<()> {
        if self.num_stocks.0 > self.num_stocks.1 {
            return Err(AccountError::InvalidRange {
                name: "num_stocks",
                low: self.num_stocks.0 as f64,
                high: self.num_stocks.1 as f64,
            });
        }
        if self.budget.0 > self.budget.1 {
            return Err(AccountError::InvalidRange {
                name: "budget",
                low: self.budget.0,
                high: self.budget.1,
            });
        }
        if self.max_steps.0 > self.max_steps.1 {
            return Err(AccountError::InvalidRange {
                name: "max_steps",
                low: self.max_steps.0 as f64,
                high: self.max_steps.1 as f64,
            });
        }
        Ok(())
    }
}

/// Vector-lane bookkeeping engine for simulated fills.
///
/// Every field is a contiguous array of length `num_envs`; lane `i` of each
/// array belongs to the same environment slot. Updates are elementwise.
pub struct LocalAccount {
    num_envs: usize,
    ranges: LaneRanges,
    rng: ChaCha8Rng,

    cash: Vec<f64>,
    position_qty: Vec<i64>,
    avg_entry_price: Vec<f64>,
    prev_nav: Vec<f64>,
    max_steps: Vec<i64>,

    // Derived state.
    unrealized_pnl: Vec<f64>,
    exposure: Vec<f64>,
    asset_nav: Vec<f64>,
}

impl LocalAccount {
    /// Create an account with entropy-seeded sampling.
    pub fn new(num_envs: usize, ranges: LaneRanges) -> AccountResult<Self> {
        Self::with_rng(num_envs, ranges, ChaCha8Rng::from_entropy())
    }

    /// Create an account with a fixed seed for reproducible episodes.
    pub fn with_seed(num_envs: usize, ranges: LaneRanges, seed: u64) -> AccountResult<Self> {
        Self::with_rng(num_envs, ranges, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(num_envs: usize, ranges: LaneRanges, mut rng: ChaCha8Rng) -> AccountResult<Self> {
        ranges.validate()?;

        // Seed each lane's cash inside the budget range so the first trade
        // does not immediately exhaust the account; with zero positions the
        // starting NAV equals cash.
        let (low, high) = ranges.budget;
        let cash: Vec<f64> = (0..num_envs).map(|_| rng.gen_range(low..=high)).collect();
        let prev_nav = cash.clone();
        let asset_nav = cash.clone();

        Ok(Self {
            num_envs,
            ranges,
            rng,
            cash,
            position_qty: vec![0; num_envs],
            avg_entry_price: vec![0.0; num_envs],
            prev_nav,
            max_steps: vec![0; num_envs],
            unrealized_pnl: vec![0.0; num_envs],
            exposure: vec![0.0; num_envs],
            asset_nav,
        })
    }

    /// Re-seed the sampling stream (used by env-level `reset(seed)`).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    pub fn cash(&self) -> &[f64] {
        &self.cash
    }

    pub fn position_qty(&self) -> &[i64] {
        &self.position_qty
    }

    pub fn avg_entry_price(&self) -> &[f64] {
        &self.avg_entry_price
    }

    pub fn asset_nav(&self) -> &[f64] {
        &self.asset_nav
    }

    pub fn max_steps(&self) -> &[i64] {
        &self.max_steps
    }

    /// Account feature rows aligned with the requested lanes, in the
    /// canonical order
    /// `[position_qty, cash, avg_entry_price, unrealized_pnl, exposure, asset_nav]`.
    pub fn get_account_features(&self, symbols: &[String]) -> Vec<[f32; ACCOUNT_FEATURE_COLS]> {
        let n = symbols.len();
        (0..n)
            .map(|i| {
                if i >= self.num_envs {
                    return [0.0; ACCOUNT_FEATURE_COLS];
                }
                [
                    self.position_qty[i] as f32,
                    self.cash[i] as f32,
                    self.avg_entry_price[i] as f32,
                    self.unrealized_pnl[i] as f32,
                    self.exposure[i] as f32,
                    self.asset_nav[i] as f32,
                ]
            })
            .collect()
    }

    /// Apply one step of fills and return the per-lane reward (ΔNAV).
    ///
    /// Fill rules:
    /// - buy: quantity +1, cash -price, average entry re-weighted over the
    ///   old quantity;
    /// - sell (quantity ≥ 1): quantity -1, cash +price; the average entry
    ///   is cleared only when the position reaches zero;
    /// - hold, or sell with nothing to sell: no-op.
    pub fn apply_actions(&mut self, actions: &[Action], prices: &[f64]) -> Vec<f32> {
        let n = self.num_envs;
        let mut reward = vec![0.0f32; n];

        for i in 0..n {
            let action = actions.get(i).copied().unwrap_or(Action::Hold);
            let price = prices.get(i).copied().unwrap_or(0.0);

            let old_qty = self.position_qty[i];
            match action {
                Action::Buy => {
                    self.cash[i] -= price;
                    self.position_qty[i] = old_qty + 1;
                    self.avg_entry_price[i] = (self.avg_entry_price[i] * old_qty as f64 + price)
                        / (old_qty as f64 + 1.0);
                }
                Action::Sell if old_qty >= 1 => {
                    self.cash[i] += price;
                    self.position_qty[i] = old_qty - 1;
                }
                Action::Sell | Action::Hold => {}
            }

            if self.position_qty[i] == 0 {
                self.avg_entry_price[i] = 0.0;
            }

            // Derived state, in order: exposure, unrealized PnL, NAV,
            // reward, then the NAV baseline for the next step.
            let qty = self.position_qty[i] as f64;
            self.exposure[i] = qty * price;
            self.unrealized_pnl[i] = (price - self.avg_entry_price[i]) * qty;

            let nav = self.cash[i] + self.exposure[i];
            reward[i] = (nav - self.prev_nav[i]) as f32;
            self.prev_nav[i] = nav;
            self.asset_nav[i] = nav;
        }

        reward
    }

    /// Reset all lanes (`indices == None`) or only the given subset, and
    /// return the freshly drawn symbol per target lane.
    ///
    /// Symbols are drawn without replacement while the pool is large enough,
    /// with replacement otherwise.
    pub fn reset_account(
        &mut self,
        symbols_pool: &[String],
        indices: Option<&[usize]>,
    ) -> AccountResult<Vec<String>> {
        let target: Vec<usize> = match indices {
            None => (0..self.num_envs).collect(),
            Some(idx) => idx.to_vec(),
        };
        if target.is_empty() {
            return Ok(Vec::new());
        }
        for &i in &target {
            if i >= self.num_envs {
                return Err(AccountError::LaneOutOfBounds {
                    index: i,
                    lanes: self.num_envs,
                });
            }
        }

        let k = target.len();
        for &i in &target {
            self.max_steps[i] = self
                .rng
                .gen_range(self.ranges.max_steps.0..=self.ranges.max_steps.1);
            self.cash[i] = self.rng.gen_range(self.ranges.budget.0..=self.ranges.budget.1);
            self.position_qty[i] = self
                .rng
                .gen_range(self.ranges.num_stocks.0..=self.ranges.num_stocks.1);
            self.avg_entry_price[i] = 0.0;
            self.exposure[i] = 0.0;
            self.unrealized_pnl[i] = 0.0;
            self.prev_nav[i] = self.cash[i];
            self.asset_nav[i] = self.cash[i];
        }

        let chosen = if symbols_pool.is_empty() {
            vec![String::new(); k]
        } else if k > symbols_pool.len() {
            (0..k)
                .map(|_| symbols_pool[self.rng.gen_range(0..symbols_pool.len())].clone())
                .collect()
        } else {
            sample(&mut self.rng, symbols_pool.len(), k)
                .into_iter()
                .map(|j| symbols_pool[j].clone())
                .collect()
        };

        debug!(lanes = k, "reset account lanes");
        Ok(chosen)
    }

    /// Re-derive exposure, unrealized PnL, and NAV for the given lanes from
    /// fresh market rows, then sync `prev_nav` so the next reward does not
    /// spike on reset frames.
    pub fn update_account(
        &mut self,
        market_features: &[[f32; MARKET_FEATURE_COLS]],
        indices: &[usize],
    ) -> AccountResult<()> {
        if market_features.len() != indices.len() {
            return Err(AccountError::FeatureShape {
                expected: indices.len(),
                got: market_features.len(),
            });
        }

        for (row, &i) in market_features.iter().zip(indices) {
            if i >= self.num_envs {
                return Err(AccountError::LaneOutOfBounds {
                    index: i,
                    lanes: self.num_envs,
                });
            }
            let price = row[3] as f64; // close column
            let qty = self.position_qty[i] as f64;
            self.exposure[i] = qty * price;
            self.unrealized_pnl[i] = (price - self.avg_entry_price[i]) * qty;
            self.asset_nav[i] = self.cash[i] + self.exposure[i];
            self.prev_nav[i] = self.asset_nav[i];
        }
        Ok(())
    }

    /// Apply the fills described by `order_results` and derive episode
    /// boundary flags.
    ///
    /// A lane terminates when its cash is exhausted and truncates when the
    /// step count reaches that lane's own `max_steps` draw.
    pub fn step_account(
        &mut self,
        order_results: &[OrderResult],
        step_count: i64,
    ) -> (Vec<f32>, Vec<bool>, Vec<bool>) {
        let n = self.num_envs;
        let mut prices = vec![0.0f64; n];
        let mut actions = vec![Action::Hold; n];
        for (i, result) in order_results.iter().take(n).enumerate() {
            prices[i] = result.filled_avg_price;
            actions[i] = result.action;
        }

        let reward = self.apply_actions(&actions, &prices);

        let terminated: Vec<bool> = self.cash.iter().map(|&c| c <= 0.0).collect();
        let truncated: Vec<bool> = self.max_steps.iter().map(|&m| step_count >= m).collect();

        (reward, truncated, terminated)
    }
}
