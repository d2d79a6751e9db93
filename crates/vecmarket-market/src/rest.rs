//! Rate-limited REST transport and per-broker bar backfill.
//!
//! Every REST round trip goes through the shared token bucket. Transport
//! failures collapse to status 0 with no body; callers decide whether a
//! missing body matters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use vecmarket_core::{frac_days_now, Bar, Broker, BrokerConfig};

use crate::bucket::TokenBucket;
use crate::cache::json_f64;
use crate::error::{MarketError, MarketResult};

/// Rate-limited HTTP session with broker auth headers.
pub struct RestTransport {
    http: reqwest::Client,
    bucket: TokenBucket,
}

impl RestTransport {
    /// Build the session with adapter-appropriate auth headers.
    pub fn new(cfg: &BrokerConfig) -> MarketResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match cfg.broker {
            Broker::Alpaca => {
                headers.insert(
                    "APCA-API-KEY-ID",
                    HeaderValue::from_str(&cfg.api_key)
                        .map_err(|e| MarketError::HttpClient(e.to_string()))?,
                );
                headers.insert(
                    "APCA-API-SECRET-KEY",
                    HeaderValue::from_str(&cfg.secret_key)
                        .map_err(|e| MarketError::HttpClient(e.to_string()))?,
                );
            }
            Broker::Binance => {
                headers.insert(
                    "X-MBX-APIKEY",
                    HeaderValue::from_str(&cfg.api_key)
                        .map_err(|e| MarketError::HttpClient(e.to_string()))?,
                );
            }
            Broker::Ibkr => {}
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MarketError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            bucket: TokenBucket::new(cfg.rest_burst, cfg.rest_rps),
        })
    }

    fn url(base: &str, path: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET returning `(status, body)`. Transport errors yield `(0, None)`;
    /// non-2xx responses keep their status but drop the body.
    pub async fn get_json(&self, base: &str, path: &str, timeout: Duration) -> (u16, Option<Value>) {
        self.bucket.acquire(1.0).await;
        let url = Self::url(base, path);
        match self.http.get(&url).timeout(timeout).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if !resp.status().is_success() {
                    return (status, None);
                }
                (status, resp.json().await.ok())
            }
            Err(e) => {
                debug!(%url, error = %e, "GET failed");
                (0, None)
            }
        }
    }

    /// POST with a JSON payload, same contract as `get_json`.
    pub async fn post_json<P: Serialize + ?Sized>(
        &self,
        base: &str,
        path: &str,
        payload: &P,
        timeout: Duration,
    ) -> (u16, Option<Value>) {
        self.bucket.acquire(1.0).await;
        let url = Self::url(base, path);
        match self
            .http
            .post(&url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if !resp.status().is_success() {
                    return (status, None);
                }
                (status, resp.json().await.ok())
            }
            Err(e) => {
                debug!(%url, error = %e, "POST failed");
                (0, None)
            }
        }
    }

    /// DELETE returning the status only (0 on transport failure).
    pub async fn delete(&self, base: &str, path: &str, timeout: Duration) -> u16 {
        self.bucket.acquire(1.0).await;
        let url = Self::url(base, path);
        match self.http.delete(&url).timeout(timeout).send().await {
            Ok(resp) => resp.status().as_u16(),
            Err(e) => {
                debug!(%url, error = %e, "DELETE failed");
                0
            }
        }
    }
}

/// Normalize one raw bar object, falling back to `price` for the close and
/// to `default_t` when the timestamp is missing or non-numeric.
fn norm_bar(item: &Value, default_t: f64) -> Bar {
    let close = {
        let c = item.get("c").map(json_f64).unwrap_or(0.0);
        if c != 0.0 {
            c
        } else {
            item.get("price").map(json_f64).unwrap_or(0.0)
        }
    };
    let t = match item.get("t") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default_t),
        _ => default_t,
    };
    Bar {
        o: item.get("o").map(json_f64).unwrap_or(0.0) as f32,
        h: item.get("h").map(json_f64).unwrap_or(0.0) as f32,
        l: item.get("l").map(json_f64).unwrap_or(0.0) as f32,
        c: close as f32,
        v: item.get("v").map(json_f64).unwrap_or(0.0) as f32,
        t,
    }
}

/// Last entry of a `bars` field that may be a list or a single object.
fn latest_of(bars: Option<&Value>) -> Option<&Value> {
    match bars {
        Some(Value::Array(entries)) => entries.last(),
        Some(bar @ Value::Object(_)) => Some(bar),
        _ => None,
    }
}

/// Per-broker latest-bar snapshot fetcher.
///
/// The dispatcher picks the implementation once at client construction
/// from `(broker, asset class)`.
#[async_trait]
pub trait BarFetcher: Send + Sync {
    async fn latest_bars(
        &self,
        rest: &RestTransport,
        symbols: &[String],
        timeout: Duration,
    ) -> HashMap<String, Bar>;
}

/// Alpaca stocks: per-symbol `GET {base}/{sym}/bars?...&limit=1`.
pub struct AlpacaStocksBars {
    base: String,
    timeframe: String,
}

#[async_trait]
impl BarFetcher for AlpacaStocksBars {
    async fn latest_bars(
        &self,
        rest: &RestTransport,
        symbols: &[String],
        timeout: Duration,
    ) -> HashMap<String, Bar> {
        let mut out = HashMap::new();
        for sym in symbols {
            let path = format!("{sym}/bars?timeframe={}&limit=1", self.timeframe);
            let (status, body) = rest.get_json(&self.base, &path, timeout).await;
            if status / 100 != 2 {
                continue;
            }
            let Some(body) = body else { continue };
            let bars = body.get("bars").or_else(|| body.get("bar"));
            if let Some(bar) = latest_of(bars) {
                out.insert(sym.clone(), norm_bar(bar, frac_days_now()));
            }
        }
        out
    }
}

/// Alpaca crypto: `GET {base}/bars?symbols={sym}&...&limit=1`, keyed by
/// symbol in the response.
pub struct AlpacaCryptoBars {
    base: String,
    timeframe: String,
}

#[async_trait]
impl BarFetcher for AlpacaCryptoBars {
    async fn latest_bars(
        &self,
        rest: &RestTransport,
        symbols: &[String],
        timeout: Duration,
    ) -> HashMap<String, Bar> {
        let mut out = HashMap::new();
        for sym in symbols {
            let path = format!("bars?symbols={sym}&timeframe={}&limit=1", self.timeframe);
            let (status, body) = rest.get_json(&self.base, &path, timeout).await;
            if status / 100 != 2 {
                continue;
            }
            let latest = body
                .as_ref()
                .and_then(|b| b.get("bars"))
                .and_then(|bars| bars.get(sym.as_str()))
                .and_then(|seq| seq.as_array())
                .and_then(|seq| seq.last());
            if let Some(bar) = latest {
                out.insert(sym.clone(), norm_bar(bar, frac_days_now()));
            }
        }
        out
    }
}

/// Binance klines: `GET {base}/v3/klines?symbol=...&interval=...&limit=1`.
pub struct BinanceBars {
    base: String,
    interval: &'static str,
}

#[async_trait]
impl BarFetcher for BinanceBars {
    async fn latest_bars(
        &self,
        rest: &RestTransport,
        symbols: &[String],
        timeout: Duration,
    ) -> HashMap<String, Bar> {
        let mut out = HashMap::new();
        for sym in symbols {
            let path = format!("v3/klines?symbol={sym}&interval={}&limit=1", self.interval);
            let (status, body) = rest.get_json(&self.base, &path, timeout).await;
            if status / 100 != 2 {
                continue;
            }
            let Some(Value::Array(klines)) = body else {
                continue;
            };
            // [openTime, o, h, l, c, v, closeTime, ...]
            let Some(Value::Array(k)) = klines.last() else {
                continue;
            };
            if k.len() < 7 {
                warn!(symbol = %sym, "short kline row");
                continue;
            }
            out.insert(
                sym.clone(),
                Bar {
                    o: json_f64(&k[1]) as f32,
                    h: json_f64(&k[2]) as f32,
                    l: json_f64(&k[3]) as f32,
                    c: json_f64(&k[4]) as f32,
                    v: json_f64(&k[5]) as f32,
                    t: json_f64(&k[6]) / 86_400_000.0,
                },
            );
        }
        out
    }
}

/// Fallback for brokers without a dedicated shape; mirrors the Alpaca
/// stocks path layout.
pub struct GenericBars {
    base: String,
    timeframe: String,
}

#[async_trait]
impl BarFetcher for GenericBars {
    async fn latest_bars(
        &self,
        rest: &RestTransport,
        symbols: &[String],
        timeout: Duration,
    ) -> HashMap<String, Bar> {
        let inner = AlpacaStocksBars {
            base: self.base.clone(),
            timeframe: self.timeframe.clone(),
        };
        inner.latest_bars(rest, symbols, timeout).await
    }
}

/// Choose the snapshot fetcher for a broker/asset-class pair.
pub fn fetcher_for(cfg: &BrokerConfig) -> Arc<dyn BarFetcher> {
    let base = cfg.data_rest_base.clone();
    match (cfg.broker, cfg.is_crypto()) {
        (Broker::Alpaca, false) => Arc::new(AlpacaStocksBars {
            base,
            timeframe: cfg.bars_timeframe.clone(),
        }),
        (Broker::Alpaca, true) => Arc::new(AlpacaCryptoBars {
            base,
            timeframe: cfg.bars_timeframe.clone(),
        }),
        (Broker::Binance, _) => Arc::new(BinanceBars {
            base,
            interval: binance_interval(&cfg.bars_timeframe),
        }),
        (Broker::Ibkr, _) => Arc::new(GenericBars {
            base,
            timeframe: cfg.bars_timeframe.clone(),
        }),
    }
}

fn binance_interval(timeframe: &str) -> &'static str {
    match timeframe.to_ascii_lowercase().as_str() {
        "1min" | "1m" => "1m",
        "5min" | "5m" => "5m",
        _ => "1m",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_norm_bar_fallbacks() {
        let bar = norm_bar(&json!({"price": 4.5, "t": "2024-01-01"}), 100.0);
        assert_eq!(bar.c, 4.5);
        assert_eq!(bar.t, 100.0);
    }

    #[test]
    fn test_latest_of_shapes() {
        let list = json!([{"c": 1.0}, {"c": 2.0}]);
        assert_eq!(latest_of(Some(&list)).unwrap()["c"], 2.0);

        let single = json!({"c": 3.0});
        assert_eq!(latest_of(Some(&single)).unwrap()["c"], 3.0);

        assert!(latest_of(Some(&json!("x"))).is_none());
        assert!(latest_of(None).is_none());
    }

    #[test]
    fn test_binance_interval_mapping() {
        assert_eq!(binance_interval("1Min"), "1m");
        assert_eq!(binance_interval("5Min"), "5m");
        assert_eq!(binance_interval("1Hour"), "1m");
    }
}
