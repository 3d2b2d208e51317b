use super::types::{Action, Signal, Strategy, Urgency};
use super::MarketView;
use crate::analysis::orderbook::imbalance;
use crate::config::StrategyParams;

// Mirror of momentum: fades an extreme imbalance with a passive quote at the touch.
pub fn evaluate(strategy: &Strategy, view: &MarketView<'_>, params: &StrategyParams) -> Vec<Signal> {
    let book = view.book;
    if book.is_empty() || book.is_crossed() {
        return Vec::new();
    }

    let imbalance = imbalance(book, params.momentum_depth);
    if imbalance.abs() <= params.mean_reversion_threshold {
        return Vec::new();
    }

    let (action, level) = if imbalance > 0.0 {
        (Action::Sell, &book.asks[0])
    } else {
        (Action::Buy, &book.bids[0])
    };

    vec![
        Signal::new(&strategy.id, book, action, level.price, level.size.min(strategy.max_order_size))
            .with_confidence(imbalance.abs() * 0.5)
            .with_urgency(Urgency::Low)
            .with_meta("imbalance", imbalance),
    ]
}
