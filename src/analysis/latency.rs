use std::collections::HashMap;

use crate::strategy::types::{Action, Signal};

/// Largest fractional price shift applied to one signal.
pub const MAX_PRICE_CORRECTION: f64 = 0.1;

/// Shifts each signal's price against itself by the venue's latency and returns the batch
/// ordered by urgency, most urgent first. Signals of equal urgency keep their input order.
pub fn optimize_signals(
    mut signals: Vec<Signal>,
    latencies_ms: &HashMap<String, f64>,
    slippage_per_ms: f64,
) -> Vec<Signal> {
    for signal in &mut signals {
        let latency = latencies_ms.get(&signal.exchange).copied().unwrap_or(0.0);
        let correction = (latency * slippage_per_ms).clamp(0.0, MAX_PRICE_CORRECTION);
        signal.price *= match signal.action {
            Action::Buy => 1.0 + correction,
            Action::Sell => 1.0 - correction,
            Action::Hold => 1.0,
        };
        let priority = signal.priority();
        signal.metadata.insert("priority".to_string(), priority.into());
        signal.metadata.insert("latency_ms".to_string(), latency.into());
    }
    signals.sort_by_key(|s| s.priority());
    signals
}
