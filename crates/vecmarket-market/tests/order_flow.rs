//! Order submission and account rollup against stubbed REST endpoints.

mod common;
use common::MockBrokerWs;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vecmarket_core::{Action, Broker, BrokerConfig, SkipReason, TradeMode};
use vecmarket_market::TradingMarket;

fn paper_config(ws_url: &str, rest_base: &str) -> BrokerConfig {
    BrokerConfig::new(Broker::Alpaca, "test-key", "test-secret")
        .unwrap()
        .with_trade_mode(TradeMode::Paper)
        .with_market_ws_url(ws_url)
        .with_trades_ws_url(ws_url)
        .with_rest_bases(rest_base, rest_base)
        .with_data_rest_base(rest_base)
}

fn local_config(ws_url: &str, rest_base: &str) -> BrokerConfig {
    BrokerConfig::new(Broker::Alpaca, "test-key", "test-secret")
        .unwrap()
        .with_market_ws_url(ws_url)
        .with_trades_ws_url(ws_url)
        .with_rest_bases(rest_base, rest_base)
        .with_data_rest_base(rest_base)
}

#[test]
fn paper_order_id_extracted_from_response() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());
    let rest = rt.block_on(MockServer::start());

    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc"})))
            .mount(&rest),
    );

    let cfg = paper_config(&server.url(), &rest.uri());
    let market = TradingMarket::connect(cfg, vec!["AAPL".into()]).unwrap();

    let results = market.submit_orders(
        &["AAPL".into()],
        &[Action::Buy],
        &[1],
        TradeMode::Paper,
    );
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].order_id.as_deref(), Some("abc"));
    assert!(!results[0].skipped);

    // Rejected orders get a synthetic err- id instead of failing the lane.
    rt.block_on(rest.reset());
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&rest),
    );
    let results = market.submit_orders(
        &["AAPL".into()],
        &[Action::Buy],
        &[1],
        TradeMode::Paper,
    );
    let order_id = results[0].order_id.as_deref().unwrap();
    assert!(order_id.starts_with("err-"), "got {order_id}");

    rt.block_on(server.shutdown());
}

#[test]
fn submit_orders_populates_every_lane() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());
    let rest = rt.block_on(MockServer::start());

    let cfg = local_config(&server.url(), &rest.uri());
    let market = TradingMarket::connect(cfg, vec!["AAPL".into(), "MSFT".into()]).unwrap();

    rt.block_on(server.broadcast(r#"[{"S":"AAPL","c":10.0},{"S":"MSFT","c":20.0}]"#));
    // Let the channel loop cache the prices before submitting.
    let _ = market.get_market_features(
        &["AAPL".into(), "MSFT".into()],
        Duration::from_secs(2),
    );

    // Duplicate lane for AAPL: the first occurrence wins, the second is
    // skipped, and every lane is populated.
    let symbols: Vec<String> = vec!["AAPL".into(), "MSFT".into(), "AAPL".into()];
    let results = market.submit_orders(
        &symbols,
        &[Action::Buy, Action::Sell, Action::Buy],
        &[1, 1, 1],
        TradeMode::Local,
    );

    assert_eq!(results.len(), 3);
    assert!(results[0].order_id.as_deref().unwrap().starts_with("local-AAPL-"));
    assert_eq!(results[0].filled_avg_price, 10.0);
    assert_eq!(results[0].action, Action::Buy);
    assert_eq!(results[1].filled_avg_price, 20.0);
    assert_eq!(results[1].action, Action::Sell);
    assert!(results[2].skipped);
    assert_eq!(results[2].reason, Some(SkipReason::DuplicateLane));

    // Local fills land in the orders cache keyed by their synthetic id.
    let id = results[0].order_id.clone().unwrap();
    let cached = market.cached_order(&id).unwrap();
    assert_eq!(cached.symbol.as_deref(), Some("AAPL"));
    assert_eq!(cached.filled_avg_price, Some(10.0));

    rt.block_on(server.shutdown());
}

#[test]
fn local_submit_auto_subscribes_missing_symbols() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());
    let rest = rt.block_on(MockServer::start());

    let cfg = local_config(&server.url(), &rest.uri());
    let market = TradingMarket::connect(cfg, vec!["AAPL".into()]).unwrap();

    let results = market.submit_orders(
        &["TSLA".into()],
        &[Action::Buy],
        &[1],
        TradeMode::Local,
    );
    assert!(market.is_subscribed("TSLA"));
    // Fill price is zero (nothing cached, backfill stub empty) but the
    // lane is still a fill, not a skip.
    assert!(!results[0].skipped);
    assert_eq!(results[0].filled_avg_price, 0.0);

    rt.block_on(server.shutdown());
}

#[test]
fn paper_step_account_rewards_nav_delta_per_symbol() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());
    let rest = rt.block_on(MockServer::start());

    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"cash": "1000", "equity": "1000"})),
            )
            .mount(&rest),
    );
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "AAPL", "qty": "2", "avg_entry_price": "10.0"}
            ])))
            .mount(&rest),
    );
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ord-1"})))
            .mount(&rest),
    );

    let cfg = paper_config(&server.url(), &rest.uri());
    let market = TradingMarket::connect(cfg, vec!["AAPL".into()]).unwrap();

    rt.block_on(server.broadcast(r#"[{"S":"AAPL","c":10.0}]"#));
    let _ = market.get_market_features(&["AAPL".into()], Duration::from_secs(2));

    let results = market.submit_orders(&["AAPL".into()], &[Action::Buy], &[1], TradeMode::Paper);
    let (reward, truncated, terminated) = market.step_account(&results, None);

    // First appearance establishes the baseline: zero reward.
    assert_eq!(reward, vec![0.0]);
    assert_eq!(truncated, vec![false]);
    assert_eq!(terminated, vec![false]);
    // nav = cash_share + qty * px = 1000 + 2 * 10
    assert_eq!(market.nav_baseline("AAPL"), Some(1020.0));

    // Price moves; the second step pays the NAV delta.
    rt.block_on(server.broadcast(r#"[{"S":"AAPL","c":15.0}]"#));
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        let rows = market.get_cached_bars(&["AAPL".into()]);
        if rows[0][3] == 15.0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let results = market.submit_orders(&["AAPL".into()], &[Action::Hold], &[1], TradeMode::Paper);
    let (reward, _, _) = market.step_account(&results, None);
    assert!((reward[0] - 10.0).abs() < 1e-3, "got {}", reward[0]);

    rt.block_on(server.shutdown());
}

#[test]
fn step_account_skips_inactive_lanes() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockBrokerWs::start());
    let rest = rt.block_on(MockServer::start());

    let cfg = paper_config(&server.url(), &rest.uri());
    let market = TradingMarket::connect(cfg, vec!["AAPL".into()]).unwrap();

    // All lanes skipped: no REST traffic, all-zero outputs.
    let results = vec![vecmarket_core::OrderResult::skipped(
        "AAPL",
        SkipReason::NoOrder,
    )];
    let (reward, truncated, terminated) = market.step_account(&results, None);
    assert_eq!(reward, vec![0.0]);
    assert_eq!(truncated, vec![false]);
    assert_eq!(terminated, vec![false]);

    rt.block_on(server.shutdown());
}
