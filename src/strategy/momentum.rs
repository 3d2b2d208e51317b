use super::types::{Action, Signal, Strategy, Urgency};
use super::MarketView;
use crate::analysis::orderbook::imbalance;
use crate::config::StrategyParams;

/// Trades with the order flow when the top-of-book imbalance is strong enough.
pub fn evaluate(strategy: &Strategy, view: &MarketView<'_>, params: &StrategyParams) -> Vec<Signal> {
    let book = view.book;
    if book.is_empty() || book.is_crossed() {
        return Vec::new();
    }

    let imbalance = imbalance(book, params.momentum_depth);
    if imbalance.abs() <= params.momentum_threshold {
        return Vec::new();
    }

    let level = if imbalance > 0.0 { &book.asks[0] } else { &book.bids[0] };
    let action = if imbalance > 0.0 { Action::Buy } else { Action::Sell };

    vec![
        Signal::new(&strategy.id, book, action, level.price, level.size.min(strategy.max_order_size))
            .with_confidence(imbalance.abs())
            .with_urgency(Urgency::High)
            .with_meta("imbalance", imbalance),
    ]
}
