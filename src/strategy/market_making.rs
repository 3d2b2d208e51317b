use super::types::{Action, Signal, Strategy, Urgency};
use super::MarketView;
use crate::config::StrategyParams;

/// Quotes both sides inside the spread once the relative spread is wider than `min_spread`.
/// Each side is sized off the opposite side's top level.
pub fn evaluate(strategy: &Strategy, view: &MarketView<'_>, params: &StrategyParams) -> Vec<Signal> {
    let book = view.book;
    let (bid, ask) = match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) if bid.price < ask.price => (bid, ask),
        _ => return Vec::new(),
    };

    let mid = (bid.price + ask.price) / 2.0;
    let spread = ask.price - bid.price;
    let relative_spread = spread / mid;
    if relative_spread <= strategy.min_spread {
        return Vec::new();
    }

    let confidence = if strategy.min_spread > 0.0 {
        relative_spread / (2.0 * strategy.min_spread)
    } else {
        0.5
    };
    let buy_size = (ask.size * params.quote_fraction).min(strategy.max_order_size);
    let sell_size = (bid.size * params.quote_fraction).min(strategy.max_order_size);

    vec![
        Signal::new(&strategy.id, book, Action::Buy, mid - spread / 4.0, buy_size)
            .with_confidence(confidence)
            .with_urgency(Urgency::Medium)
            .with_meta("spread", spread),
        Signal::new(&strategy.id, book, Action::Sell, mid + spread / 4.0, sell_size)
            .with_confidence(confidence)
            .with_urgency(Urgency::Medium)
            .with_meta("spread", spread),
    ]
}
