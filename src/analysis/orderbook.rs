use serde::{Deserialize, Serialize};

use crate::aggregator::types::{Level, OrderBook};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookAnalysis {
    pub exchange: String,
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    pub spread_percent: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
    pub imbalance: f64,
    pub mid_price: f64,
    /// Notional resting within the analysed depth, both sides.
    pub liquidity: f64,
    pub crossed: bool,
}

/// `(bid_volume - ask_volume) / (bid_volume + ask_volume)` over the top `depth` levels.
pub fn imbalance(book: &OrderBook, depth: usize) -> f64 {
    let bid_volume = volume(&book.bids, depth);
    let ask_volume = volume(&book.asks, depth);
    let total = bid_volume + ask_volume;
    if total > 0.0 {
        (bid_volume - ask_volume) / total
    } else {
        0.0
    }
}

fn volume(levels: &[Level], depth: usize) -> f64 {
    levels.iter().take(depth).map(|l| l.size).sum()
}

fn notional(levels: &[Level], depth: usize) -> f64 {
    levels.iter().take(depth).map(|l| l.price * l.size).sum()
}

pub fn analyze_order_book(book: &OrderBook, depth: usize) -> Result<BookAnalysis> {
    let (best_bid, best_ask) = match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => (bid.price, ask.price),
        _ => {
            return Err(PipelineError::Worker(format!(
                "cannot analyse one-sided book {}",
                book.key()
            )))
        }
    };

    let mid_price = (best_bid + best_ask) / 2.0;
    let spread = best_ask - best_bid;
    let bid_volume = volume(&book.bids, depth);
    let ask_volume = volume(&book.asks, depth);

    Ok(BookAnalysis {
        exchange: book.exchange.clone(),
        symbol: book.symbol.clone(),
        best_bid,
        best_ask,
        spread,
        spread_percent: if mid_price > 0.0 { spread / mid_price * 100.0 } else { 0.0 },
        bid_volume,
        ask_volume,
        imbalance: imbalance(book, depth),
        mid_price,
        liquidity: notional(&book.bids, depth) + notional(&book.asks, depth),
        crossed: best_bid >= best_ask,
    })
}
