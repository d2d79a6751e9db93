//! Local-mode rollout through the full env/market/account stack.

mod common;
use common::MockBrokerWs;

use std::time::Duration;

use vecmarket_account::LaneRanges;
use vecmarket_core::{Broker, BrokerConfig};
use vecmarket_env::TradingVecEnv;
use vecmarket_market::TradingMarket;

fn local_config(ws_url: &str) -> BrokerConfig {
    BrokerConfig::new(Broker::Alpaca, "test-key", "test-secret")
        .unwrap()
        .with_market_ws_url(ws_url)
        .with_trades_ws_url(ws_url)
        .with_rest_bases("http://127.0.0.1:1", "http://127.0.0.1:1")
        .with_data_rest_base("http://127.0.0.1:1")
}

fn fixed_ranges(cash: f64) -> LaneRanges {
    LaneRanges {
        num_stocks: (0, 0),
        budget: (cash, cash),
        max_steps: (100, 100),
    }
}

/// Push a bar and wait until the env's market cache reflects it.
fn set_price(rt: &tokio::runtime::Runtime, server: &MockBrokerWs, env: &TradingVecEnv, close: f64) {
    rt.block_on(server.broadcast(format!(r#"[{{"S":"AAPL","c":{close},"t":0.5}}]"#)));
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        let rows = env.market().get_cached_bars(&["AAPL".into()]);
        if (rows[0][3] as f64 - close).abs() < 1e-6 {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("price {close} never reached the cache");
}

#[test]
fn buy_then_sell_rollout() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());

    let market = TradingMarket::connect(local_config(&server.url()), vec!["AAPL".into()]).unwrap();
    let mut env = TradingVecEnv::new(1, market, fixed_ranges(1000.0)).unwrap();

    let obs = env.reset(Some(7)).unwrap();
    assert_eq!(obs.asset_id.len(), 1);
    assert_eq!(obs.asset_id[0][0], 1); // US
    assert_eq!(obs.asset_id[0][3], 1); // lane-local symbol id

    set_price(&rt, &server, &env, 10.0);

    // Buy at 10: cash drops, exposure cancels it, reward is zero.
    let step = env.step(&[1]).unwrap();
    assert!(!step.terminated[0] && !step.truncated[0]);
    assert!(step.reward[0].abs() < 1e-6);
    let account = step.observation.account_features[0];
    assert_eq!(account[0], 1.0); // position_qty
    assert_eq!(account[1], 990.0); // cash
    assert_eq!(account[2], 10.0); // avg_entry_price

    // Price moves to 12; sell pockets the gain.
    set_price(&rt, &server, &env, 12.0);
    let step = env.step(&[2]).unwrap();
    assert!((step.reward[0] - 2.0).abs() < 1e-3);
    let account = step.observation.account_features[0];
    assert_eq!(account[0], 0.0);
    assert_eq!(account[1], 1002.0);
    assert_eq!(account[2], 0.0);

    // Observation market row carries the streamed close; time features
    // stay bounded.
    assert_eq!(step.observation.market_features[0][3], 12.0);
    for x in step.observation.time_features[0] {
        assert!((-1.0..=1.0).contains(&x));
    }

    env.close();
    rt.block_on(server.shutdown());
}

#[test]
fn exhausted_lane_auto_resets_without_reward_spike() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());

    let market = TradingMarket::connect(local_config(&server.url()), vec!["AAPL".into()]).unwrap();
    let mut env = TradingVecEnv::new(1, market, fixed_ranges(5.0)).unwrap();

    env.reset(Some(3)).unwrap();
    set_price(&rt, &server, &env, 10.0);

    // Buying at 10 with 5 cash exhausts the lane within the same step.
    let step = env.step(&[1]).unwrap();
    assert!(step.terminated[0]);

    // Auto-reset already re-seeded the lane back inside the budget range.
    let account = env.local_account().unwrap();
    assert_eq!(account.cash(), &[5.0]);
    assert_eq!(account.position_qty(), &[0]);

    // Holding right after the reset earns no spurious reward.
    let step = env.step(&[0]).unwrap();
    assert!(step.reward[0].abs() < 1e-6, "got {}", step.reward[0]);
    assert!(!step.terminated[0]);

    env.close();
    rt.block_on(server.shutdown());
}

#[test]
fn lanes_cycle_when_seed_list_is_short() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());

    let market = TradingMarket::connect(
        local_config(&server.url()),
        vec!["AAPL".into(), "MSFT".into()],
    )
    .unwrap();
    let env = TradingVecEnv::new(5, market, LaneRanges::default()).unwrap();

    assert_eq!(
        env.symbols(),
        &["AAPL", "MSFT", "AAPL", "MSFT", "AAPL"]
    );
    assert_eq!(env.action_space().nvec.len(), 5);
    assert_eq!(env.observation_space().market_shape, (5, 5));

    rt.block_on(server.shutdown());
}
