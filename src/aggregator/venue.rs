use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use super::types::{Level, OrderBook};
use crate::error::{PipelineError, Result};

/// Levels kept per side after a delta is applied, for venues that send deletes themselves.
pub const MAX_LEVELS: usize = 50;

const BINANCE_DEPTH: usize = 20;
/// Kraken only sends deletes inside the subscribed depth; the client truncates the rest.
const KRAKEN_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Binance,
    Coinbase,
    Kraken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookMessageKind {
    Snapshot,
    Delta,
}

/// A book message translated out of a venue's wire shape, not yet merged into a book.
#[derive(Debug, Clone)]
pub struct BookMessage {
    pub kind: BookMessageKind,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub event_time: Option<DateTime<Utc>>,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Venue {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "coinbase" => Ok(Venue::Coinbase),
            "kraken" => Ok(Venue::Kraken),
            _ => Err(PipelineError::UnknownExchange(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Coinbase => "coinbase",
            Venue::Kraken => "kraken",
        }
    }

    /// Venue-native spelling of a canonical `BASE/QUOTE` symbol.
    pub fn native_symbol(&self, symbol: &str) -> String {
        let (base, quote) = symbol.split_once('/').unwrap_or((symbol, ""));
        match self {
            Venue::Binance => format!("{}{}", base, quote).to_lowercase(),
            Venue::Coinbase => format!("{}-{}", base, quote).to_uppercase(),
            Venue::Kraken => {
                let base = if base.eq_ignore_ascii_case("BTC") { "XBT" } else { base };
                format!("{}/{}", base, quote).to_uppercase()
            }
        }
    }

    pub fn stream_url(&self, symbol: &str) -> String {
        match self {
            Venue::Binance => format!(
                "wss://stream.binance.com:9443/ws/{}@depth{}@100ms",
                self.native_symbol(symbol),
                BINANCE_DEPTH
            ),
            Venue::Coinbase => "wss://ws-feed.exchange.coinbase.com".to_string(),
            Venue::Kraken => "wss://ws.kraken.com".to_string(),
        }
    }

    /// Message sent right after the socket opens, if the venue needs one.
    pub fn subscribe_message(&self, symbol: &str) -> Option<String> {
        let native = self.native_symbol(symbol);
        match self {
            Venue::Binance => None,
            Venue::Coinbase => Some(
                json!({
                    "type": "subscribe",
                    "product_ids": [native],
                    "channels": ["level2_batch"],
                })
                .to_string(),
            ),
            Venue::Kraken => Some(
                json!({
                    "event": "subscribe",
                    "pair": [native],
                    "subscription": {"name": "book", "depth": KRAKEN_DEPTH},
                })
                .to_string(),
            ),
        }
    }

    /// Levels per side a book from this venue may hold.
    pub fn book_depth(&self) -> usize {
        match self {
            Venue::Binance => BINANCE_DEPTH,
            Venue::Coinbase => MAX_LEVELS,
            Venue::Kraken => KRAKEN_DEPTH,
        }
    }

    /// Public REST endpoint used as a cheap connectivity check.
    pub fn ping_url(&self) -> &'static str {
        match self {
            Venue::Binance => "https://api.binance.com/api/v3/ping",
            Venue::Coinbase => "https://api.exchange.coinbase.com/time",
            Venue::Kraken => "https://api.kraken.com/0/public/Time",
        }
    }

    /// Translates one frame. `Ok(None)` means a well-formed message that carries no book data
    /// (heartbeats, subscription acks).
    pub fn parse(&self, raw: &str) -> Result<Option<BookMessage>> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| PipelineError::parse(self.name(), e))?;
        match self {
            Venue::Binance => self.parse_binance(&value),
            Venue::Coinbase => self.parse_coinbase(&value),
            Venue::Kraken => self.parse_kraken(&value),
        }
    }

    fn parse_binance(&self, value: &Value) -> Result<Option<BookMessage>> {
        // Request acks look like {"result": null, "id": 1}.
        if value.get("result").is_some() && value.get("id").is_some() {
            return Ok(None);
        }
        let bids = self.parse_required_side(value, "bids", true)?;
        let asks = self.parse_required_side(value, "asks", true)?;
        let event_time = value
            .get("E")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        Ok(Some(BookMessage {
            kind: BookMessageKind::Snapshot,
            bids,
            asks,
            event_time,
        }))
    }

    fn parse_coinbase(&self, value: &Value) -> Result<Option<BookMessage>> {
        let event_time = value
            .get("time")
            .and_then(Value::as_str)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        match value.get("type").and_then(Value::as_str) {
            Some("snapshot") => Ok(Some(BookMessage {
                kind: BookMessageKind::Snapshot,
                bids: self.parse_required_side(value, "bids", true)?,
                asks: self.parse_required_side(value, "asks", true)?,
                event_time,
            })),
            Some("l2update") => {
                let changes = value
                    .get("changes")
                    .and_then(Value::as_array)
                    .ok_or_else(|| PipelineError::parse(self.name(), "l2update without changes"))?;
                let mut bids = Vec::new();
                let mut asks = Vec::new();
                for change in changes {
                    let fields = change
                        .as_array()
                        .ok_or_else(|| PipelineError::parse(self.name(), "change is not an array"))?;
                    let side = fields.first().and_then(Value::as_str);
                    let level = Value::Array(fields.iter().skip(1).cloned().collect());
                    let level = self.parse_level(&level, false)?;
                    match side {
                        Some("buy") => bids.push(level),
                        Some("sell") => asks.push(level),
                        _ => return Err(PipelineError::parse(self.name(), "unknown change side")),
                    }
                }
                Ok(Some(BookMessage {
                    kind: BookMessageKind::Delta,
                    bids,
                    asks,
                    event_time,
                }))
            }
            Some(_) => Ok(None),
            None => Err(PipelineError::parse(self.name(), "message without type")),
        }
    }

    // Book frames are arrays: [channel_id, {"bs": .., "as": ..}, "book-10", pair]. Deltas use
    // "b"/"a" and may split bids and asks across two payload objects.
    fn parse_kraken(&self, value: &Value) -> Result<Option<BookMessage>> {
        let frame = match value {
            Value::Array(frame) => frame,
            Value::Object(_) => return Ok(None),
            _ => return Err(PipelineError::parse(self.name(), "unexpected frame")),
        };
        let payloads: Vec<&Value> = frame.iter().filter(|v| v.is_object()).collect();
        if payloads.is_empty() {
            return Err(PipelineError::parse(self.name(), "book frame without payload"));
        }

        let mut message = BookMessage {
            kind: BookMessageKind::Delta,
            bids: Vec::new(),
            asks: Vec::new(),
            event_time: None,
        };
        for payload in payloads {
            if payload.get("bs").is_some() || payload.get("as").is_some() {
                message.kind = BookMessageKind::Snapshot;
                message.bids.extend(self.parse_side(payload.get("bs"), false)?);
                message.asks.extend(self.parse_side(payload.get("as"), false)?);
            } else {
                message.bids.extend(self.parse_side(payload.get("b"), false)?);
                message.asks.extend(self.parse_side(payload.get("a"), false)?);
            }
            message.event_time = message.event_time.max(kraken_event_time(payload));
        }
        Ok(Some(message))
    }

    /// Snapshot sides must be present; a missing side would wipe the stored book.
    fn parse_required_side(&self, value: &Value, key: &str, with_count: bool) -> Result<Vec<Level>> {
        match value.get(key) {
            Some(side @ Value::Array(_)) => self.parse_side(Some(side), with_count),
            Some(_) => Err(PipelineError::parse(self.name(), format!("{} is not an array", key))),
            None => Err(PipelineError::parse(self.name(), format!("snapshot without {}", key))),
        }
    }

    fn parse_side(&self, side: Option<&Value>, with_count: bool) -> Result<Vec<Level>> {
        match side {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(levels)) => levels
                .iter()
                .map(|level| self.parse_level(level, with_count))
                .collect(),
            Some(_) => Err(PipelineError::parse(self.name(), "book side is not an array")),
        }
    }

    fn parse_level(&self, level: &Value, with_count: bool) -> Result<Level> {
        let fields = level
            .as_array()
            .ok_or_else(|| PipelineError::parse(self.name(), "level is not an array"))?;
        let price = fields
            .first()
            .and_then(number)
            .ok_or_else(|| PipelineError::parse(self.name(), "level without price"))?;
        let size = fields
            .get(1)
            .and_then(number)
            .ok_or_else(|| PipelineError::parse(self.name(), "level without size"))?;
        if !price.is_finite() || !size.is_finite() || price <= 0.0 || size < 0.0 {
            return Err(PipelineError::parse(self.name(), format!("invalid level {}@{}", size, price)));
        }
        let count = if with_count {
            fields.get(2).and_then(number).map(|n| n as u64).unwrap_or(1)
        } else {
            1
        };
        Ok(Level::new(price, size, count))
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn kraken_event_time(payload: &Value) -> Option<DateTime<Utc>> {
    ["bs", "as", "b", "a"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|level| level.get(2).and_then(number))
        .fold(None, |latest: Option<f64>, ts| Some(latest.map_or(ts, |l| l.max(ts))))
        .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0) as i64).single())
}

impl BookMessage {
    /// Merges this message into the previous snapshot for the pair and caps each side at the
    /// venue's book depth. A delta with no prior snapshot has nothing to apply to and yields
    /// `None`.
    pub fn apply(self, previous: Option<&OrderBook>, venue: Venue, symbol: &str) -> Option<OrderBook> {
        let (mut bids, mut asks) = match self.kind {
            BookMessageKind::Snapshot => (self.bids, self.asks),
            BookMessageKind::Delta => {
                let previous = previous?;
                let mut bids = previous.bids.clone();
                let mut asks = previous.asks.clone();
                merge_levels(&mut bids, self.bids);
                merge_levels(&mut asks, self.asks);
                (bids, asks)
            }
        };

        bids.retain(|level| level.size > 0.0);
        asks.retain(|level| level.size > 0.0);
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
        bids.truncate(venue.book_depth());
        asks.truncate(venue.book_depth());

        let mut book = OrderBook::new(venue.name(), symbol, bids, asks);
        if let Some(event_time) = self.event_time {
            book.timestamp = event_time;
        }
        Some(book)
    }
}

fn merge_levels(book_side: &mut Vec<Level>, changes: Vec<Level>) {
    for change in changes {
        if let Some(existing) = book_side.iter_mut().find(|l| l.price == change.price) {
            existing.size = change.size;
            existing.count = change.count;
        } else {
            book_side.push(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_string_levels_are_parsed_and_sorted() {
        let raw = r#"{"lastUpdateId":1,"E":1700000000000,
            "bids":[["99.5","2.0"],["100.0","1.0"]],
            "asks":[["100.4","1.5"],["100.2","1.0"]]}"#;
        let message = Venue::Binance.parse(raw).unwrap().unwrap();
        let book = message.apply(None, Venue::Binance, "BTC/USDT").unwrap();
        assert_eq!(book.best_bid().unwrap().price, 100.0);
        assert_eq!(book.best_ask().unwrap().price, 100.2);
        assert_eq!(book.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn coinbase_numeric_levels_keep_count() {
        let raw = r#"{"type":"snapshot","product_id":"BTC-USDT",
            "bids":[[100, 1, 3]],"asks":[[100.2, 1]]}"#;
        let message = Venue::Coinbase.parse(raw).unwrap().unwrap();
        assert_eq!(message.bids[0], Level::new(100.0, 1.0, 3));
        assert_eq!(message.asks[0].count, 1);
    }

    #[test]
    fn coinbase_delta_updates_and_removes_levels() {
        let snapshot = Venue::Coinbase
            .parse(r#"{"type":"snapshot","bids":[["100","1"],["99","2"]],"asks":[["101","1"]]}"#)
            .unwrap()
            .unwrap()
            .apply(None, Venue::Coinbase, "BTC/USDT")
            .unwrap();
        let delta = Venue::Coinbase
            .parse(r#"{"type":"l2update","changes":[["buy","100","0"],["sell","100.5","4"]]}"#)
            .unwrap()
            .unwrap();
        let book = delta.apply(Some(&snapshot), Venue::Coinbase, "BTC/USDT").unwrap();
        assert_eq!(book.best_bid().unwrap().price, 99.0);
        assert_eq!(book.best_ask().unwrap(), &Level::new(100.5, 4.0, 1));
    }

    #[test]
    fn delta_without_snapshot_is_skipped() {
        let delta = Venue::Coinbase
            .parse(r#"{"type":"l2update","changes":[["buy","100","1"]]}"#)
            .unwrap()
            .unwrap();
        assert!(delta.apply(None, Venue::Coinbase, "BTC/USDT").is_none());
    }

    #[test]
    fn kraken_snapshot_frame() {
        let raw = r#"[0,{"as":[["5541.3","2.5","1534614248.123678"]],
            "bs":[["5541.2","1.5","1534614248.765567"]]},"book-10","XBT/USDT"]"#;
        let message = Venue::Kraken.parse(raw).unwrap().unwrap();
        assert_eq!(message.kind, BookMessageKind::Snapshot);
        assert_eq!(message.asks[0].price, 5541.3);
        assert!(message.event_time.is_some());
    }

    #[test]
    fn control_messages_carry_no_book() {
        assert!(Venue::Kraken.parse(r#"{"event":"heartbeat"}"#).unwrap().is_none());
        assert!(Venue::Coinbase
            .parse(r#"{"type":"subscriptions","channels":[]}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn malformed_messages_are_parse_errors() {
        assert!(matches!(
            Venue::Binance.parse("not json"),
            Err(PipelineError::Parse { .. })
        ));
        assert!(Venue::Binance.parse(r#"{"bids":[["abc","1"]],"asks":[]}"#).is_err());
        assert!(Venue::Binance.parse(r#"{"bids":"nope"}"#).is_err());
    }

    #[test]
    fn snapshots_missing_a_side_are_rejected() {
        assert!(matches!(Venue::Binance.parse("{}"), Err(PipelineError::Parse { .. })));
        assert!(Venue::Binance.parse(r#"{"bids":[["100","1"]]}"#).is_err());
        assert!(Venue::Coinbase.parse(r#"{"type":"snapshot","asks":[["101","1"]]}"#).is_err());
        assert!(Venue::Binance.parse(r#"{"result":null,"id":1}"#).unwrap().is_none());
    }

    #[test]
    fn kraken_deltas_merge_and_respect_subscribed_depth() {
        let snapshot = Venue::Kraken
            .parse(r#"[0,{"bs":[["100.0","1.0","1700000000.0"],["99.9","2.0","1700000000.0"]],
                "as":[["100.2","1.0","1700000000.0"],["100.3","2.0","1700000000.0"]]},"book-10","XBT/USDT"]"#)
            .unwrap()
            .unwrap()
            .apply(None, Venue::Kraken, "BTC/USDT")
            .unwrap();

        let removal = Venue::Kraken
            .parse(r#"[0,{"a":[["100.2","0.0","1700000001.0"]]},{"b":[["99.9","3.0","1700000001.0"]]},"book-10","XBT/USDT"]"#)
            .unwrap()
            .unwrap();
        assert_eq!(removal.kind, BookMessageKind::Delta);
        let mut book = removal.apply(Some(&snapshot), Venue::Kraken, "BTC/USDT").unwrap();
        assert_eq!(book.best_ask().unwrap().price, 100.3);
        assert_eq!(book.bids[1], Level::new(99.9, 3.0, 1));

        for i in 1..=12 {
            let frame = format!(
                r#"[0,{{"b":[["{:.1}","1.0","1700000002.0"]]}},"book-10","XBT/USDT"]"#,
                100.0 + i as f64 * 0.1
            );
            let delta = Venue::Kraken.parse(&frame).unwrap().unwrap();
            book = delta.apply(Some(&book), Venue::Kraken, "BTC/USDT").unwrap();
        }
        assert_eq!(book.bids.len(), 10);
        assert_eq!(book.best_bid().unwrap().price, 101.2);
        assert!(book.bids.iter().all(|l| l.price > 100.2));
    }

    #[test]
    fn native_symbols() {
        assert_eq!(Venue::Binance.native_symbol("BTC/USDT"), "btcusdt");
        assert_eq!(Venue::Coinbase.native_symbol("BTC/USDT"), "BTC-USDT");
        assert_eq!(Venue::Kraken.native_symbol("BTC/USDT"), "XBT/USDT");
        assert!(Venue::from_name("Binance").is_ok());
    }
}
