//! Synchronous trading-market client.
//!
//! Owns the two WS channels, the REST session, and the shared caches, and
//! exposes the snapshot/order surface the vectorized environment consumes.
//! Synchronous methods bridge onto the private I/O runtime; recoverable
//! transport failures degrade to empty/zero results instead of erroring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vecmarket_core::{
    registry, Action, Broker, BrokerConfig, OrderPayload, OrderResult, SkipReason, TradeMode,
    ACCOUNT_FEATURE_COLS, MARKET_FEATURE_COLS,
};

use crate::bucket::TokenBucket;
use crate::cache::{json_f64, MarketCaches, OrderUpdate};
use crate::channel::{
    connect_ws, recv_json, run_market_loop, run_trades_loop, send_json, ChannelHandle, ChannelKind,
};
use crate::error::MarketResult;
use crate::rest::{fetcher_for, BarFetcher, RestTransport};
use crate::runtime::IoRuntime;

/// Default bound for REST calls.
const REST_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound for the one-shot snapshot backfill.
const BACKFILL_TIMEOUT: Duration = Duration::from_secs(2);
/// Cache polling interval while waiting for subscribed bars.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared with tasks on the I/O runtime.
struct Shared {
    cfg: BrokerConfig,
    caches: Arc<Mutex<MarketCaches>>,
    rest: RestTransport,
    ws_bucket: Arc<TokenBucket>,
    backfiller: Arc<dyn BarFetcher>,
    stop: CancellationToken,
    market_channel: Mutex<Option<ChannelHandle>>,
    trades_channel: Mutex<Option<ChannelHandle>>,
}

impl Shared {
    fn recv_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.cfg.recv_timeout_sec.max(0.01))
    }

    fn channel_slot(&self, kind: ChannelKind) -> &Mutex<Option<ChannelHandle>> {
        match kind {
            ChannelKind::Market => &self.market_channel,
            ChannelKind::Trades => &self.trades_channel,
        }
    }

    /// Connect sequence per channel: open WS, auth, announce initial
    /// subscriptions (market) or order/account streams (trades), then
    /// spawn the read loop.
    async fn connect_channel(
        self: Arc<Self>,
        kind: ChannelKind,
        init_symbols: Vec<String>,
    ) -> MarketResult<()> {
        let url = match kind {
            ChannelKind::Market => self.cfg.market_ws_url.clone(),
            ChannelKind::Trades => self.cfg.trades_ws_url.clone(),
        };
        info!(channel = kind.name(), %url, "connecting WS channel");

        let ws = connect_ws(&url).await?;
        let (sink_half, mut source) = futures_util::StreamExt::split(ws);
        let sink = Arc::new(tokio::sync::Mutex::new(sink_half));

        send_json(
            &sink,
            &json!({"action": "auth", "key": self.cfg.api_key, "secret": self.cfg.secret_key}),
        )
        .await;
        // One ack frame; a silent broker is tolerated.
        let _ack = recv_json(&mut source, self.recv_timeout()).await;

        if kind == ChannelKind::Market && !init_symbols.is_empty() {
            let add: Vec<String> = {
                let mut caches = self.caches.lock();
                init_symbols
                    .into_iter()
                    .filter(|s| caches.subscribed.insert(s.clone()))
                    .collect()
            };
            if !add.is_empty() {
                send_json(&sink, &json!({"action": "subscribe", "bars": add})).await;
            }
        }

        if kind == ChannelKind::Trades && self.cfg.broker == Broker::Alpaca {
            // Both the v2-style subscribe and the legacy listen shape, for
            // compatibility across Alpaca stream generations.
            send_json(
                &sink,
                &json!({"action": "subscribe", "orders": ["*"], "account": ["*"]}),
            )
            .await;
            send_json(
                &sink,
                &json!({"action": "listen", "data": {"streams": ["trade_updates", "account_updates"]}}),
            )
            .await;
        }

        let task = match kind {
            ChannelKind::Market => tokio::spawn(run_market_loop(
                source,
                self.caches.clone(),
                self.ws_bucket.clone(),
                self.recv_timeout(),
                self.stop.child_token(),
            )),
            ChannelKind::Trades => tokio::spawn(run_trades_loop(
                source,
                self.caches.clone(),
                self.ws_bucket.clone(),
                self.recv_timeout(),
                self.stop.child_token(),
            )),
        };

        *self.channel_slot(kind).lock() = Some(ChannelHandle { sink, task });
        info!(channel = kind.name(), "WS channel connected");
        Ok(())
    }

    /// Cancel the loop task, await it, and close the socket.
    async fn close_channel(self: Arc<Self>, kind: ChannelKind) {
        let handle = self.channel_slot(kind).lock().take();
        if let Some(handle) = handle {
            handle.task.abort();
            let _ = handle.task.await;
            let mut sink = handle.sink.lock().await;
            let _ = futures_util::SinkExt::close(&mut *sink).await;
            debug!(channel = kind.name(), "WS channel closed");
        }
    }

    /// Full teardown: trades first, then market.
    async fn close_all(self: Arc<Self>) {
        self.stop.cancel();
        self.clone().close_channel(ChannelKind::Trades).await;
        self.close_channel(ChannelKind::Market).await;
    }

    /// Add unseen symbols to the subscription set and announce them.
    async fn subscribe(self: Arc<Self>, symbols: Vec<String>) {
        let add: Vec<String> = {
            let mut caches = self.caches.lock();
            symbols
                .into_iter()
                .filter(|s| caches.subscribed.insert(s.clone()))
                .collect()
        };
        if add.is_empty() {
            return;
        }
        let sink = self.market_channel.lock().as_ref().map(|h| h.sink.clone());
        if let Some(sink) = sink {
            send_json(&sink, &json!({"action": "subscribe", "bars": add})).await;
        }
    }

    /// Remove present symbols from the subscription set and announce the
    /// removal.
    async fn unsubscribe(self: Arc<Self>, symbols: Vec<String>) {
        let rm: Vec<String> = {
            let mut caches = self.caches.lock();
            symbols
                .into_iter()
                .filter(|s| caches.subscribed.remove(s))
                .collect()
        };
        if rm.is_empty() {
            return;
        }
        let sink = self.market_channel.lock().as_ref().map(|h| h.sink.clone());
        if let Some(sink) = sink {
            send_json(&sink, &json!({"action": "unsubscribe", "bars": rm})).await;
        }
    }

    /// Reconcile subscriptions to exactly `symbols` and clear the
    /// per-episode NAV history.
    async fn reset_subscriptions(self: Arc<Self>, symbols: Vec<String>) {
        let current: Vec<String> = self.caches.lock().subscribed.iter().cloned().collect();
        let rm: Vec<String> = current
            .iter()
            .filter(|s| !symbols.contains(s))
            .cloned()
            .collect();
        let add: Vec<String> = symbols
            .iter()
            .filter(|s| !current.contains(s))
            .cloned()
            .collect();

        if !rm.is_empty() {
            self.clone().unsubscribe(rm).await;
        }
        if !add.is_empty() {
            self.clone().subscribe(add).await;
        }
        self.caches.lock().account.nav_prev_by_sym.clear();
    }

    /// One-shot latest-bar snapshot into the bar cache; returns how many
    /// symbols were refreshed.
    async fn backfill(self: Arc<Self>, symbols: Vec<String>) -> usize {
        if symbols.is_empty() {
            return 0;
        }
        let bars = self
            .backfiller
            .latest_bars(&self.rest, &symbols, BACKFILL_TIMEOUT)
            .await;
        let updated = bars.len();
        if updated > 0 {
            let mut caches = self.caches.lock();
            for (symbol, bar) in bars {
                caches.bars.insert(symbol, bar);
            }
        }
        debug!(requested = symbols.len(), updated, "bar backfill");
        updated
    }

    /// `GET /account` and `GET /positions`, merging account fields into
    /// the cache.
    async fn account_and_positions(self: Arc<Self>) -> (Map<String, Value>, Vec<Value>) {
        let base = self.cfg.rest_base().to_string();
        let (_status, account) = self.rest.get_json(&base, "/account", REST_TIMEOUT).await;
        let (_status, positions) = self.rest.get_json(&base, "/positions", REST_TIMEOUT).await;

        let account = account
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let positions = positions
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();

        if !account.is_empty() {
            self.caches.lock().account.merge(&account);
        }
        (account, positions)
    }

    /// POST one market order per symbol, mapping each response to an id.
    ///
    /// Rejections keep the lane alive with a synthetic `err-` id; transport
    /// failures get `exc-`.
    async fn submit_orders_rest(
        self: Arc<Self>,
        symbols: Vec<String>,
        sides: Vec<Action>,
        qtys: Vec<i64>,
    ) -> Vec<String> {
        let base = self.cfg.rest_base().to_string();
        let mut outs = Vec::with_capacity(symbols.len());
        for ((sym, side), qty) in symbols.iter().zip(sides).zip(qtys) {
            let payload = OrderPayload::market_day(sym.clone(), qty, side);
            let (status, body) = self
                .rest
                .post_json(&base, "/orders", &payload, REST_TIMEOUT)
                .await;
            let now_us = chrono::Utc::now().timestamp_micros();
            let order_id = if status / 100 == 2 {
                body.as_ref()
                    .and_then(|b| b.get("id"))
                    .and_then(crate::cache::json_string)
                    .unwrap_or_else(|| format!("order-{now_us}"))
            } else if status != 0 {
                format!("err-{sym}-{now_us}")
            } else {
                format!("exc-{sym}-{now_us}")
            };
            outs.push(order_id);
        }
        outs
    }

    /// Rate-limited order cancellation.
    async fn cancel_orders(self: Arc<Self>, order_ids: Vec<String>) {
        let base = self.cfg.rest_base().to_string();
        for id in order_ids {
            let status = self
                .rest
                .delete(&base, &format!("/orders/{id}"), REST_TIMEOUT)
                .await;
            debug!(order_id = %id, status, "cancel order");
        }
    }
}

/// Concurrency-intensive client owning the market-data and trades streams,
/// the REST session, and the shared caches.
pub struct TradingMarket {
    shared: Arc<Shared>,
    runtime: IoRuntime,
    trade_mode: TradeMode,
    freeze_subscriptions: bool,
    init_symbols: Vec<String>,
    country_id: u32,
    exchange_id: u32,
    asset_type_id: u32,
    closed: bool,
}

impl TradingMarket {
    /// Connect the client: spawn the I/O runtime, open the market WS (and
    /// the trades WS for paper/real), and run a best-effort snapshot
    /// backfill of the seed symbols.
    pub fn connect(cfg: BrokerConfig, symbols: Vec<String>) -> MarketResult<Self> {
        let trade_mode = cfg.trade_mode;
        let freeze_subscriptions = trade_mode.freeze_subscriptions();
        let init_symbols = dedup_preserve(symbols);

        let country_id = registry::country_id(&cfg.country_code);
        let exchange_id = registry::exchange_id(country_id, &cfg.exchange_code);
        let asset_type_id = registry::asset_type_id(&cfg.asset_type);

        let rest = RestTransport::new(&cfg)?;
        let backfiller = fetcher_for(&cfg);
        let ws_bucket = Arc::new(TokenBucket::new(cfg.ws_pull_burst, cfg.ws_pull_rps));

        let shared = Arc::new(Shared {
            cfg,
            caches: Arc::new(Mutex::new(MarketCaches::default())),
            rest,
            ws_bucket,
            backfiller,
            stop: CancellationToken::new(),
            market_channel: Mutex::new(None),
            trades_channel: Mutex::new(None),
        });
        let runtime = IoRuntime::start("market-io")?;

        let client = Self {
            shared,
            runtime,
            trade_mode,
            freeze_subscriptions,
            init_symbols,
            country_id,
            exchange_id,
            asset_type_id,
            closed: false,
        };

        client.connect_market()?;

        // Populate the cache immediately; tolerated to fail when markets
        // are closed or the data API is unreachable.
        let seed = client.init_symbols.clone();
        match client
            .runtime
            .block_on_remote(client.shared.clone().backfill(seed))
        {
            Ok(updated) => debug!(updated, "initial snapshot backfill"),
            Err(e) => warn!(error = %e, "initial snapshot backfill failed"),
        }

        // Order/account updates stream only for paper or real trading.
        if !trade_mode.is_local() {
            client.connect_trades()?;
        }

        Ok(client)
    }

    // ----- lifecycle -----

    pub fn connect_market(&self) -> MarketResult<()> {
        self.runtime
            .block_on_remote(
                self.shared
                    .clone()
                    .connect_channel(ChannelKind::Market, self.init_symbols.clone()),
            )
            .and_then(|r| r)
    }

    pub fn connect_trades(&self) -> MarketResult<()> {
        self.runtime
            .block_on_remote(
                self.shared
                    .clone()
                    .connect_channel(ChannelKind::Trades, Vec::new()),
            )
            .and_then(|r| r)
    }

    pub fn close_market(&self) {
        let _ = self
            .runtime
            .block_on_remote(self.shared.clone().close_channel(ChannelKind::Market));
    }

    pub fn close_trades(&self) {
        let _ = self
            .runtime
            .block_on_remote(self.shared.clone().close_channel(ChannelKind::Trades));
    }

    /// Stop the loops, close the sockets, and join the I/O thread with a
    /// bounded wait. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.runtime.block_on_remote(self.shared.clone().close_all()) {
            warn!(error = %e, "close_all did not complete");
        }
        self.runtime.shutdown();
    }

    // ----- identity -----

    pub fn trade_mode(&self) -> TradeMode {
        self.trade_mode
    }

    pub fn init_symbols(&self) -> &[String] {
        &self.init_symbols
    }

    pub fn country_id(&self) -> u32 {
        self.country_id
    }

    pub fn exchange_id(&self) -> u32 {
        self.exchange_id
    }

    pub fn asset_type_id(&self) -> u32 {
        self.asset_type_id
    }

    // ----- subscriptions -----

    /// Announce new symbols to the market stream. Ignored (returns false)
    /// when subscriptions are frozen in paper/real mode.
    pub fn subscribe(&self, symbols: &[String]) -> bool {
        if self.freeze_subscriptions {
            for s in symbols {
                info!(symbol = %s, "subscribe ignored while frozen");
            }
            return false;
        }
        let _ = self
            .runtime
            .block_on_remote(self.shared.clone().subscribe(symbols.to_vec()));
        true
    }

    /// Remove symbols from the market stream; frozen like `subscribe`.
    pub fn unsubscribe(&self, symbols: &[String]) -> bool {
        if self.freeze_subscriptions {
            for s in symbols {
                info!(symbol = %s, "unsubscribe ignored while frozen");
            }
            return false;
        }
        let _ = self
            .runtime
            .block_on_remote(self.shared.clone().unsubscribe(symbols.to_vec()));
        true
    }

    /// Best-effort episode refresh for local mode: reconcile the
    /// subscription set to `symbols` and clear per-episode NAV deltas.
    /// Safe to call in any mode.
    pub fn reset_subscriptions(&self, symbols: &[String]) {
        if self.freeze_subscriptions {
            return;
        }
        let symbols = dedup_preserve(symbols.to_vec());
        let _ = self
            .runtime
            .block_on_remote(self.shared.clone().reset_subscriptions(symbols));
    }

    /// Snapshot of the current subscription set.
    pub fn subscribed_symbols(&self) -> Vec<String> {
        self.shared.caches.lock().subscribed.iter().cloned().collect()
    }

    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.shared.caches.lock().subscribed.contains(symbol)
    }

    // ----- market snapshots -----

    /// Cached `[o, h, l, c, v, t]` rows aligned with `symbols`, preserving
    /// order and duplicates. Lanes with a cache miss or zero close trigger
    /// one backfill of the affected unique symbols before re-reading.
    pub fn get_cached_bars(&self, symbols: &[String]) -> Vec<[f32; MARKET_FEATURE_COLS]> {
        let mut out = self.read_rows(symbols);

        let mut needs = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for (i, sym) in symbols.iter().enumerate() {
            if out[i][3] == 0.0 && seen.insert(sym.clone()) {
                needs.push(sym.clone());
            }
        }
        if !needs.is_empty() {
            let _ = self
                .runtime
                .block_on_remote(self.shared.clone().backfill(needs));
            out = self.read_rows(symbols);
        }
        out
    }

    /// Subscribe missing symbols (when not frozen), wait briefly for the
    /// cache to fill, then return aligned rows with one backfill attempt
    /// for stale lanes.
    pub fn get_market_features(
        &self,
        symbols: &[String],
        timeout: Duration,
    ) -> Vec<[f32; MARKET_FEATURE_COLS]> {
        self.ensure_bars(symbols, timeout);
        self.get_cached_bars(symbols)
    }

    fn read_rows(&self, symbols: &[String]) -> Vec<[f32; MARKET_FEATURE_COLS]> {
        let t_now = vecmarket_core::frac_days_now();
        let caches = self.shared.caches.lock();
        symbols
            .iter()
            .map(|s| match caches.bars.get(s) {
                Some(bar) => bar.to_row(),
                None => [0.0, 0.0, 0.0, 0.0, 0.0, t_now as f32],
            })
            .collect()
    }

    fn ensure_bars(&self, symbols: &[String], timeout: Duration) {
        let syms = dedup_preserve(symbols.to_vec());
        if syms.is_empty() {
            return;
        }
        let deadline = Instant::now() + timeout;

        if !self.freeze_subscriptions {
            let miss: Vec<String> = {
                let caches = self.shared.caches.lock();
                syms.iter()
                    .filter(|s| !caches.subscribed.contains(*s))
                    .cloned()
                    .collect()
            };
            if !miss.is_empty() {
                self.subscribe(&miss);
            }
        }

        // Wait until every subscribed symbol in the request has a cache
        // entry, polling in 10 ms slices.
        let need: Vec<String> = {
            let caches = self.shared.caches.lock();
            syms.iter()
                .filter(|s| caches.subscribed.contains(*s))
                .cloned()
                .collect()
        };
        while Instant::now() < deadline && !need.is_empty() {
            let have_all = {
                let caches = self.shared.caches.lock();
                need.iter().all(|s| caches.bars.contains_key(s))
            };
            if have_all {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        // One-shot backfill for anything still stale.
        let zeros: Vec<String> = {
            let caches = self.shared.caches.lock();
            syms.iter()
                .filter(|s| caches.close(s) == 0.0)
                .cloned()
                .collect()
        };
        if !zeros.is_empty() {
            let _ = self
                .runtime
                .block_on_remote(self.shared.clone().backfill(zeros));
        }
    }

    // ----- account snapshots -----

    /// Account feature rows for paper/real mode, aligned with `symbols`:
    /// `[position_qty, cash, avg_entry_price, unrealized_pnl, exposure, asset_nav]`.
    /// Cash is split equally across lanes.
    pub fn get_account_features(&self, symbols: &[String]) -> Vec<[f32; ACCOUNT_FEATURE_COLS]> {
        let (account, positions) = self
            .runtime
            .block_on_remote(self.shared.clone().account_and_positions())
            .unwrap_or_default();

        let pos_by_sym = index_positions(&positions);
        let n = symbols.len().max(1);
        let cash_share = account.get("cash").map(json_f64).unwrap_or(0.0) / n as f64;

        let caches = self.shared.caches.lock();
        symbols
            .iter()
            .map(|s| {
                let (qty, avg) = pos_by_sym.get(s).copied().unwrap_or((0.0, 0.0));
                let px = caches.close(s);
                let exposure = qty * px;
                let unrealized = (px - avg) * qty;
                let nav = cash_share + exposure;
                [
                    qty as f32,
                    cash_share as f32,
                    avg as f32,
                    unrealized as f32,
                    exposure as f32,
                    nav as f32,
                ]
            })
            .collect()
    }

    // ----- orders -----

    /// Submit one market order per lane with dedup by symbol.
    ///
    /// The result array always has one entry per input lane: the first
    /// lane of each symbol carries its order outcome, later duplicates and
    /// unsubscribed symbols are marked skipped, and untouched lanes are
    /// back-filled with a `no_order` skip.
    pub fn submit_orders(
        &self,
        symbols: &[String],
        sides: &[Action],
        qtys: &[i64],
        mode: TradeMode,
    ) -> Vec<OrderResult> {
        let n = symbols.len();
        let mut results: Vec<Option<OrderResult>> = vec![None; n];

        // Auto-subscribe only in local mode.
        if mode.is_local() && !self.freeze_subscriptions {
            let miss: Vec<String> = {
                let caches = self.shared.caches.lock();
                symbols
                    .iter()
                    .filter(|s| !caches.subscribed.contains(*s))
                    .cloned()
                    .collect()
            };
            if !miss.is_empty() {
                self.subscribe(&miss);
            }
        }

        let mut uniq_syms: Vec<String> = Vec::new();
        let mut uniq_sides: Vec<Action> = Vec::new();
        let mut uniq_qtys: Vec<i64> = Vec::new();
        let mut first_idx: HashMap<String, usize> = HashMap::new();
        {
            let caches = self.shared.caches.lock();
            for i in 0..n {
                let sym = &symbols[i];
                if !caches.subscribed.contains(sym) {
                    results[i] = Some(OrderResult::skipped(sym, SkipReason::NotSubscribed));
                    continue;
                }
                if first_idx.contains_key(sym) {
                    results[i] = Some(OrderResult::skipped(sym, SkipReason::DuplicateLane));
                    continue;
                }
                first_idx.insert(sym.clone(), i);
                uniq_syms.push(sym.clone());
                uniq_sides.push(sides.get(i).copied().unwrap_or(Action::Hold));
                uniq_qtys.push(qtys.get(i).copied().unwrap_or(1));
            }
        }

        if !uniq_syms.is_empty() {
            // Pre-warm prices to reduce zero-price fills.
            let _ = self.get_market_features(&uniq_syms, Duration::from_millis(500));
        }

        if mode.is_local() {
            let now_us = chrono::Utc::now().timestamp_micros();
            let mut caches = self.shared.caches.lock();
            for (j, sym) in uniq_syms.iter().enumerate() {
                let price = caches.close(sym);
                let order_id = format!("local-{sym}-{}", now_us + j as i64);
                caches.orders.insert(
                    order_id.clone(),
                    OrderUpdate {
                        id: order_id.clone(),
                        symbol: Some(sym.clone()),
                        status: Some("filled".to_string()),
                        filled_avg_price: Some(price),
                    },
                );
                results[first_idx[sym]] =
                    Some(OrderResult::local_fill(sym, order_id, price, uniq_sides[j]));
            }
        } else if !uniq_syms.is_empty() {
            let outs = self.runtime.block_on_remote(self.shared.clone().submit_orders_rest(
                uniq_syms.clone(),
                uniq_sides.clone(),
                uniq_qtys,
            ));
            match outs {
                Ok(outs) => {
                    for (j, sym) in uniq_syms.iter().enumerate() {
                        results[first_idx[sym]] = Some(match outs.get(j) {
                            Some(id) => OrderResult::accepted(sym, id.clone()),
                            None => OrderResult::skipped(sym, SkipReason::NoOrder),
                        });
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    for sym in &uniq_syms {
                        results[first_idx[sym]] = Some(OrderResult::errored(sym, msg.clone()));
                    }
                }
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.unwrap_or_else(|| OrderResult::skipped(&symbols[i], SkipReason::NoOrder)))
            .collect()
    }

    /// Rate-limited `DELETE /orders/{id}` for each id.
    pub fn cancel_orders(&self, order_ids: &[String]) {
        let _ = self
            .runtime
            .block_on_remote(self.shared.clone().cancel_orders(order_ids.to_vec()));
    }

    /// Last-seen payload for an order id, when cached.
    pub fn cached_order(&self, order_id: &str) -> Option<OrderUpdate> {
        self.shared.caches.lock().orders.get(order_id).cloned()
    }

    // ----- reward plumbing (paper/real) -----

    /// Per-lane NAV deltas against the broker account.
    ///
    /// Active lanes are the first occurrence of each subscribed,
    /// non-skipped symbol; everything else earns zero reward. The first
    /// appearance of a symbol establishes its NAV baseline and also earns
    /// zero.
    pub fn step_account(
        &self,
        order_results: &[OrderResult],
        symbols: Option<&[String]>,
    ) -> (Vec<f32>, Vec<bool>, Vec<bool>) {
        let syms: Vec<String> = match symbols {
            Some(list) => list.to_vec(),
            None => order_results
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    if !r.symbol.is_empty() {
                        r.symbol.clone()
                    } else {
                        self.init_symbols.get(i).cloned().unwrap_or_default()
                    }
                })
                .collect(),
        };

        let n = syms.len();
        let mut reward = vec![0.0f32; n];
        let truncated = vec![false; n];
        let terminated = vec![false; n];

        let mut first_idx: HashMap<String, usize> = HashMap::new();
        let mut active: Vec<String> = Vec::new();
        {
            let caches = self.shared.caches.lock();
            for (i, sym) in syms.iter().enumerate() {
                if sym.is_empty() || !caches.subscribed.contains(sym) {
                    continue;
                }
                if order_results.get(i).map(|r| r.skipped).unwrap_or(true) {
                    continue;
                }
                if first_idx.contains_key(sym) {
                    continue;
                }
                first_idx.insert(sym.clone(), i);
                active.push(sym.clone());
            }
        }
        if active.is_empty() {
            return (reward, truncated, terminated);
        }

        let (account, positions) = self
            .runtime
            .block_on_remote(self.shared.clone().account_and_positions())
            .unwrap_or_default();
        let cash_total = account.get("cash").map(json_f64).unwrap_or(0.0);
        let cash_share = cash_total / active.len() as f64;
        let qty_map: HashMap<String, f64> = index_positions(&positions)
            .into_iter()
            .map(|(s, (qty, _avg))| (s, qty))
            .collect();

        let (prices, prev_map): (HashMap<String, f64>, HashMap<String, f64>) = {
            let caches = self.shared.caches.lock();
            (
                active.iter().map(|s| (s.clone(), caches.close(s))).collect(),
                caches.account.nav_prev_by_sym.clone(),
            )
        };

        let mut nav_map: HashMap<String, f64> = HashMap::new();
        for sym in &active {
            let nav = cash_share
                + qty_map.get(sym).copied().unwrap_or(0.0)
                    * prices.get(sym).copied().unwrap_or(0.0);
            nav_map.insert(sym.clone(), nav);
            // A symbol with no recorded baseline earns zero on its first
            // active step rather than its full NAV.
            if let Some(prev) = prev_map.get(sym) {
                reward[first_idx[sym]] = (nav - prev) as f32;
            }
        }
        self.shared.caches.lock().account.nav_prev_by_sym = nav_map;

        (reward, truncated, terminated)
    }

    /// Previous-NAV baseline per symbol (diagnostics and tests).
    pub fn nav_baseline(&self, symbol: &str) -> Option<f64> {
        self.shared
            .caches
            .lock()
            .account
            .nav_prev_by_sym
            .get(symbol)
            .copied()
    }
}

impl Drop for TradingMarket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drop duplicate symbols while preserving first-seen order.
fn dedup_preserve(symbols: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    symbols
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Index `/positions` entries by symbol as `(qty, avg_entry_price)`.
fn index_positions(positions: &[Value]) -> HashMap<String, (f64, f64)> {
    let mut out = HashMap::new();
    for p in positions {
        let Some(symbol) = p.get("symbol").and_then(|v| v.as_str()) else {
            continue;
        };
        if symbol.is_empty() {
            continue;
        }
        let qty = p
            .get("qty")
            .or_else(|| p.get("quantity"))
            .map(json_f64)
            .unwrap_or(0.0);
        let avg = p
            .get("avg_entry_price")
            .or_else(|| p.get("avg_price"))
            .map(json_f64)
            .unwrap_or(0.0);
        out.insert(symbol.to_string(), (qty, avg));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dedup_preserve_order() {
        let symbols = vec![
            "B".to_string(),
            "A".to_string(),
            "B".to_string(),
            "C".to_string(),
            "A".to_string(),
        ];
        assert_eq!(dedup_preserve(symbols), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_index_positions_field_variants() {
        let positions = vec![
            json!({"symbol": "AAPL", "qty": "3", "avg_entry_price": "150.5"}),
            json!({"symbol": "MSFT", "quantity": 2, "avg_price": 200.0}),
            json!({"qty": 9}),
        ];
        let map = index_positions(&positions);
        assert_eq!(map.get("AAPL"), Some(&(3.0, 150.5)));
        assert_eq!(map.get("MSFT"), Some(&(2.0, 200.0)));
        assert_eq!(map.len(), 2);
    }
}
