use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Level {
    pub price: f64,
    pub size: f64,
    pub count: u64,
}

impl Level {
    pub fn new(price: f64, size: f64, count: u64) -> Self {
        Self { price, size, count }
    }
}

/// Latest snapshot for one `(exchange, symbol)` pair. Bids descend, asks ascend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderBook {
    pub exchange: String,
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(exchange: &str, symbol: &str, bids: Vec<Level>, asks: Vec<Level>) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            bids,
            asks,
            timestamp: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        book_key(&self.exchange, &self.symbol)
    }

    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// True when the best bid is at or through the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }
}

pub fn book_key(exchange: &str, symbol: &str) -> String {
    format!("{}:{}", exchange, symbol)
}

/// One order book update as it travels from the connection manager to the pipeline.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub book: OrderBook,
    pub received_at: DateTime<Utc>,
}
