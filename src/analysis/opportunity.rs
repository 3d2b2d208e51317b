use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::types::OrderBook;
use crate::arbitrage::ArbitrageOpportunity;

/// One venue's price for a symbol at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub exchange: String,
    pub price: f64,
    pub volume: f64,
}

impl PriceObservation {
    /// Mid price and the thinner top-of-book size; `None` for one-sided or crossed books.
    pub fn from_book(book: &OrderBook) -> Option<Self> {
        if book.is_crossed() {
            return None;
        }
        let (bid, ask) = (book.best_bid()?, book.best_ask()?);
        Some(Self {
            exchange: book.exchange.clone(),
            price: (bid.price + ask.price) / 2.0,
            volume: bid.size.min(ask.size),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DetectionParams {
    pub threshold_pct: f64,
    pub ttl: Duration,
}

/// Pairwise spread check across venues. Every pair whose spread exceeds the threshold
/// becomes an opportunity buying on the cheaper venue.
pub fn detect_opportunities(
    symbol: &str,
    observations: &[PriceObservation],
    params: &DetectionParams,
) -> Vec<ArbitrageOpportunity> {
    let now = Utc::now();
    let mut found = Vec::new();

    for (i, a) in observations.iter().enumerate() {
        for b in observations.iter().skip(i + 1) {
            if a.exchange == b.exchange || a.price <= 0.0 || b.price <= 0.0 {
                continue;
            }
            let (low, high) = if a.price <= b.price { (a, b) } else { (b, a) };
            let spread = high.price - low.price;
            let spread_percent = spread / low.price * 100.0;
            if spread_percent <= params.threshold_pct {
                continue;
            }
            let volume = low.volume.min(high.volume);
            found.push(ArbitrageOpportunity {
                symbol: symbol.to_string(),
                exchange1: low.exchange.clone(),
                exchange2: high.exchange.clone(),
                price1: low.price,
                price2: high.price,
                spread,
                spread_percent,
                volume,
                profit: spread * volume,
                confidence: (spread_percent / (params.threshold_pct * 10.0)).clamp(0.0, 1.0),
                timestamp: now,
                expiry: now + params.ttl,
            });
        }
    }
    found
}
