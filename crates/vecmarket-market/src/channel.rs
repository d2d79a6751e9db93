//! WS channel plumbing shared by the market and trades streams.
//!
//! Each connected channel splits into a sink (kept for later subscribe
//! frames) and a read loop task. Loops pull one frame per WS token, parse
//! it, and fold the result into the shared caches; they stop when the
//! cancellation token fires or the stream ends.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bucket::TokenBucket;
use crate::cache::MarketCaches;
use crate::error::{MarketError, MarketResult};
use crate::parser::{parse_market_frame, parse_trade_frame, TradeUpdate};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

/// Which stream a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Market,
    Trades,
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Trades => "trades",
        }
    }
}

/// Live channel: the write half plus its loop task.
pub struct ChannelHandle {
    pub sink: Arc<tokio::sync::Mutex<WsSink>>,
    pub task: tokio::task::JoinHandle<()>,
}

/// One received frame, already decoded when textual.
pub enum Frame {
    Json(Value),
    /// Timed out, or a frame we do not decode (ping/pong handled by tungstenite).
    Empty,
    Closed,
}

/// Open a WS connection.
pub async fn connect_ws(url: &str) -> MarketResult<WsStream> {
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|source| MarketError::WsConnect {
            url: url.to_string(),
            source,
        })?;
    Ok(ws)
}

/// Send a JSON frame, swallowing transport errors.
pub async fn send_json(sink: &Arc<tokio::sync::Mutex<WsSink>>, value: &Value) {
    let text = value.to_string();
    let mut guard = sink.lock().await;
    if let Err(e) = guard.send(Message::Text(text.into())).await {
        debug!(error = %e, "WS send failed");
    }
}

/// Receive one frame with a bound; timeouts and undecodable frames are
/// `Empty`, stream end is `Closed`.
pub async fn recv_json(source: &mut WsSource, timeout: Duration) -> Frame {
    let next = match tokio::time::timeout(timeout, source.next()).await {
        Err(_) => return Frame::Empty,
        Ok(None) => return Frame::Closed,
        Ok(Some(Err(e))) => {
            debug!(error = %e, "WS recv failed");
            return Frame::Closed;
        }
        Ok(Some(Ok(msg))) => msg,
    };

    let text = match next {
        Message::Text(text) => text.to_string(),
        Message::Binary(bytes) => match String::from_utf8(bytes.into()) {
            Ok(text) => text,
            Err(_) => return Frame::Empty,
        },
        Message::Close(_) => return Frame::Closed,
        _ => return Frame::Empty,
    };

    match serde_json::from_str(&text) {
        Ok(value) => Frame::Json(value),
        Err(_) => Frame::Empty,
    }
}

/// Market channel loop: bar frames into the bar cache.
pub async fn run_market_loop(
    mut source: WsSource,
    caches: Arc<Mutex<MarketCaches>>,
    bucket: Arc<TokenBucket>,
    recv_timeout: Duration,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = bucket.acquire(1.0) => {}
        }
        match recv_json(&mut source, recv_timeout).await {
            Frame::Json(msg) => {
                let pairs = parse_market_frame(&msg);
                if pairs.is_empty() {
                    continue;
                }
                let mut caches = caches.lock();
                for (symbol, bar) in pairs {
                    caches.bars.insert(symbol, bar);
                }
            }
            Frame::Empty => continue,
            Frame::Closed => {
                warn!("market stream ended");
                break;
            }
        }
    }
    debug!("market channel loop stopped");
}

/// Trades channel loop: order/account frames into their caches.
pub async fn run_trades_loop(
    mut source: WsSource,
    caches: Arc<Mutex<MarketCaches>>,
    bucket: Arc<TokenBucket>,
    recv_timeout: Duration,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = bucket.acquire(1.0) => {}
        }
        match recv_json(&mut source, recv_timeout).await {
            Frame::Json(msg) => match parse_trade_frame(&msg) {
                TradeUpdate::Order(order) => {
                    let mut caches = caches.lock();
                    caches.orders.insert(order.id.clone(), order);
                }
                TradeUpdate::Account(payload) => {
                    let mut caches = caches.lock();
                    caches.account.merge(&payload);
                }
                TradeUpdate::Other => {}
            },
            Frame::Empty => continue,
            Frame::Closed => {
                warn!("trades stream ended");
                break;
            }
        }
    }
    debug!("trades channel loop stopped");
}
