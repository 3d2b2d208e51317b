use super::types::{Action, Signal, Strategy, Urgency};
use super::MarketView;
use crate::config::StrategyParams;

/// Compares the local mid against a reference price for the same symbol on another venue.
/// Buys locally when the reference is richer, sells when it is cheaper.
pub fn evaluate(strategy: &Strategy, view: &MarketView<'_>, params: &StrategyParams) -> Vec<Signal> {
    let book = view.book;
    let Some(reference) = view.reference_price.filter(|p| *p > 0.0) else {
        return Vec::new();
    };
    let (bid, ask) = match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) if bid.price < ask.price => (bid, ask),
        _ => return Vec::new(),
    };

    let local = (bid.price + ask.price) / 2.0;
    let diff_percent = (reference - local) / local * 100.0;
    if diff_percent.abs() <= params.arbitrage_threshold_pct {
        return Vec::new();
    }

    let (action, level) = if diff_percent > 0.0 {
        (Action::Buy, ask)
    } else {
        (Action::Sell, bid)
    };
    let confidence = diff_percent.abs() / (params.arbitrage_threshold_pct * 10.0);

    vec![
        Signal::new(&strategy.id, book, action, level.price, level.size.min(strategy.max_order_size))
            .with_confidence(confidence)
            .with_urgency(Urgency::Critical)
            .with_meta("reference_price", reference)
            .with_meta("spread_percent", diff_percent),
    ]
}
