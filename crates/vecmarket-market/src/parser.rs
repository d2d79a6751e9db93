//! WS frame parsers.
//!
//! Market frames normalize to `(symbol, Bar)` pairs; trades frames
//! classify into a tagged `TradeUpdate`. Anything malformed is simply
//! dropped so the channel loops keep running.

use serde_json::Value;

use vecmarket_core::{frac_days_now, Bar};

use crate::cache::{json_f64, json_string, OrderUpdate};

/// Classified payload from the trades/account stream.
#[derive(Debug, Clone)]
pub enum TradeUpdate {
    Order(OrderUpdate),
    Account(serde_json::Map<String, Value>),
    Other,
}

/// Normalize a market frame into `(symbol, bar)` pairs.
///
/// Accepts a bare list of bar objects, an envelope carrying `bars` or
/// `data` arrays, or a single bar object. Entries without a symbol field
/// (`S` or `symbol`) are skipped; a missing close falls back to `price`,
/// and a non-numeric timestamp falls back to the current fractional day.
pub fn parse_market_frame(msg: &Value) -> Vec<(String, Bar)> {
    let items: Vec<&Value> = match msg {
        Value::Array(entries) => entries.iter().filter(|v| v.is_object()).collect(),
        Value::Object(map) => {
            if let Some(Value::Array(entries)) = map.get("bars") {
                entries.iter().filter(|v| v.is_object()).collect()
            } else if let Some(Value::Array(entries)) = map.get("data") {
                entries.iter().filter(|v| v.is_object()).collect()
            } else {
                vec![msg]
            }
        }
        _ => return Vec::new(),
    };

    let now_fd = frac_days_now();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(symbol) = item
            .get("S")
            .or_else(|| item.get("symbol"))
            .and_then(json_string)
        else {
            continue;
        };

        let close = {
            let c = item.get("c").map(json_f64).unwrap_or(0.0);
            if c != 0.0 {
                c
            } else {
                item.get("price").map(json_f64).unwrap_or(0.0)
            }
        };
        let t = match item.get("t") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(now_fd),
            _ => now_fd,
        };

        out.push((
            symbol,
            Bar {
                o: item.get("o").map(json_f64).unwrap_or(0.0) as f32,
                h: item.get("h").map(json_f64).unwrap_or(0.0) as f32,
                l: item.get("l").map(json_f64).unwrap_or(0.0) as f32,
                c: close as f32,
                v: item.get("v").map(json_f64).unwrap_or(0.0) as f32,
                t,
            },
        ));
    }
    out
}

/// Classify a trades-stream frame.
///
/// Order payloads carry `filled_avg_price` or a type starting with
/// `order`; account payloads carry `cash`/`equity` or the legacy
/// `account_updates` stream tag. Everything else is `Other`.
pub fn parse_trade_frame(msg: &Value) -> TradeUpdate {
    let item = match msg {
        Value::Array(entries) => match entries.first() {
            Some(first) => first,
            None => return TradeUpdate::Other,
        },
        Value::Object(_) => msg,
        _ => return TradeUpdate::Other,
    };
    let Some(map) = item.as_object() else {
        return TradeUpdate::Other;
    };

    let type_field = map.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if map.contains_key("filled_avg_price") || type_field.starts_with("order") {
        let id = map
            .get("id")
            .and_then(json_string)
            .unwrap_or_else(synthetic_order_id);
        return TradeUpdate::Order(OrderUpdate {
            id,
            symbol: map.get("symbol").and_then(json_string),
            status: map.get("status").and_then(json_string),
            filled_avg_price: map.get("filled_avg_price").map(json_f64),
        });
    }

    let stream = map.get("stream").and_then(|v| v.as_str()).unwrap_or("");
    if map.contains_key("cash") || map.contains_key("equity") || stream == "account_updates" {
        return TradeUpdate::Account(map.clone());
    }

    TradeUpdate::Other
}

/// Order id for stream payloads that arrive without one.
fn synthetic_order_id() -> String {
    format!("order-{}", chrono::Utc::now().timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bare_list() {
        let msg = json!([{"S": "X", "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5, "v": 100.0, "t": 19700.0}]);
        let pairs = parse_market_frame(&msg);
        assert_eq!(pairs.len(), 1);
        let (symbol, bar) = &pairs[0];
        assert_eq!(symbol, "X");
        assert_eq!(bar.o, 1.0);
        assert_eq!(bar.h, 2.0);
        assert_eq!(bar.l, 0.5);
        assert_eq!(bar.c, 1.5);
        assert_eq!(bar.v, 100.0);
        assert_eq!(bar.t, 19700.0);
    }

    #[test]
    fn test_parse_bars_envelope_matches_list() {
        let inner = json!({"S": "X", "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5, "v": 100.0, "t": 19700.0});
        let from_list = parse_market_frame(&json!([inner.clone()]));
        let from_envelope = parse_market_frame(&json!({ "bars": [inner] }));
        assert_eq!(from_list, from_envelope);
    }

    #[test]
    fn test_parse_data_envelope_and_single_dict() {
        let inner = json!({"symbol": "Y", "c": 3.25});
        assert_eq!(parse_market_frame(&json!({ "data": [inner.clone()] })).len(), 1);
        let single = parse_market_frame(&inner);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].0, "Y");
        assert_eq!(single[0].1.c, 3.25);
    }

    #[test]
    fn test_close_falls_back_to_price() {
        let pairs = parse_market_frame(&json!({"S": "Z", "price": 9.5}));
        assert_eq!(pairs[0].1.c, 9.5);
    }

    #[test]
    fn test_non_numeric_timestamp_uses_now() {
        let pairs = parse_market_frame(&json!({"S": "Z", "c": 1.0, "t": "2024-01-01T00:00:00Z"}));
        assert!(pairs[0].1.t > 19_000.0);
    }

    #[test]
    fn test_symbolless_entries_dropped() {
        assert!(parse_market_frame(&json!({"c": 1.0})).is_empty());
        assert!(parse_market_frame(&json!("nonsense")).is_empty());
    }

    #[test]
    fn test_trade_frame_order_classification() {
        let update = parse_trade_frame(&json!({
            "id": "abc", "symbol": "AAPL", "filled_avg_price": "101.5", "status": "filled"
        }));
        match update {
            TradeUpdate::Order(order) => {
                assert_eq!(order.id, "abc");
                assert_eq!(order.symbol.as_deref(), Some("AAPL"));
                assert_eq!(order.filled_avg_price, Some(101.5));
            }
            other => panic!("expected order, got {other:?}"),
        }

        // Type-prefixed classification, id synthesized.
        let update = parse_trade_frame(&json!({"type": "order_fill"}));
        match update {
            TradeUpdate::Order(order) => assert!(order.id.starts_with("order-")),
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[test]
    fn test_trade_frame_account_classification() {
        let update = parse_trade_frame(&json!({"cash": "5000", "equity": "5100"}));
        assert!(matches!(update, TradeUpdate::Account(_)));

        let update = parse_trade_frame(&json!({"stream": "account_updates", "data": {}}));
        assert!(matches!(update, TradeUpdate::Account(_)));
    }

    #[test]
    fn test_trade_frame_other() {
        assert!(matches!(
            parse_trade_frame(&json!({"stream": "listening"})),
            TradeUpdate::Other
        ));
        assert!(matches!(parse_trade_frame(&json!([])), TradeUpdate::Other));
    }

    #[test]
    fn test_trade_frame_takes_first_list_item() {
        let update = parse_trade_frame(&json!([{"filled_avg_price": 10.0}, {"cash": 1}]));
        assert!(matches!(update, TradeUpdate::Order(_)));
    }
}
