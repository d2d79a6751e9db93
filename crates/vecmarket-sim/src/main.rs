//! Rollout harness: drive the vectorized trading env with a random policy.
//!
//! Credentials and sizing come from the environment (`ALPACA_API_KEY`,
//! `ALPACA_SECRET_KEY`, `NUM_ENVS`, `TOTAL_STEPS`, `FPS_INTERVAL`) with
//! CLI flags taking precedence.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vecmarket_account::LaneRanges;
use vecmarket_core::{registry, Broker, BrokerConfig, TradeMode};
use vecmarket_env::TradingVecEnv;
use vecmarket_market::TradingMarket;

/// Vectorized trading environment rollout.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Broker backend.
    #[arg(long, default_value = "alpaca")]
    broker: Broker,

    /// Execution mode: local, paper, or real.
    #[arg(long, default_value = "local")]
    trade_mode: TradeMode,

    #[arg(long, env = "ALPACA_API_KEY")]
    api_key: String,

    #[arg(long, env = "ALPACA_SECRET_KEY")]
    secret_key: String,

    /// Comma-separated seed symbols; defaults to the primary stock list.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Number of parallel symbol lanes.
    #[arg(long, env = "NUM_ENVS", default_value_t = 8)]
    num_envs: usize,

    /// Steps to run before exiting.
    #[arg(long, env = "TOTAL_STEPS", default_value_t = 1_000)]
    total_steps: u64,

    /// Report the step rate every this many steps.
    #[arg(long, env = "FPS_INTERVAL", default_value_t = 100)]
    fps_interval: u64,

    /// Policy RNG seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    info!(
        broker = %args.broker,
        mode = %args.trade_mode,
        num_envs = args.num_envs,
        "starting rollout"
    );

    let symbols: Vec<String> = if args.symbols.is_empty() {
        registry::PRIMARY_STOCK_SYMBOLS
            .iter()
            .take(args.num_envs.max(1))
            .map(|s| s.to_string())
            .collect()
    } else {
        args.symbols
    };

    let cfg = BrokerConfig::new(args.broker, args.api_key, args.secret_key)
        .context("invalid broker config")?
        .with_trade_mode(args.trade_mode);

    let market = TradingMarket::connect(cfg, symbols).context("market connect failed")?;
    let mut env = TradingVecEnv::new(args.num_envs, market, LaneRanges::default())?;

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut obs = env.reset(Some(args.seed))?;
    info!(lanes = obs.asset_id.len(), "environment reset");

    let mut episode_return = 0.0f64;
    let mut window_start = Instant::now();
    for step in 1..=args.total_steps {
        let actions: Vec<i64> = (0..env.num_envs()).map(|_| rng.gen_range(0..3)).collect();
        let result = env.step(&actions)?;
        obs = result.observation;
        episode_return += result.reward.iter().map(|&r| r as f64).sum::<f64>();

        if step % args.fps_interval == 0 {
            let fps = args.fps_interval as f64 / window_start.elapsed().as_secs_f64();
            let done_lanes = result
                .terminated
                .iter()
                .zip(&result.truncated)
                .filter(|(te, tr)| **te || **tr)
                .count();
            info!(
                step,
                fps = format!("{fps:.1}"),
                episode_return = format!("{episode_return:.2}"),
                done_lanes,
                "rollout progress"
            );
            window_start = Instant::now();
        }
    }

    let final_nav: f32 = obs.account_features.iter().map(|row| row[5]).sum();
    info!(
        total_steps = args.total_steps,
        episode_return = format!("{episode_return:.2}"),
        final_nav = format!("{final_nav:.2}"),
        "rollout finished"
    );

    env.close();
    Ok(())
}
