use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregator::types::OrderBook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MarketMaking,
    Arbitrage,
    Momentum,
    MeanReversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Dispatch rank; lower goes first.
    pub fn priority(&self) -> u8 {
        match self {
            Urgency::Critical => 1,
            Urgency::High => 2,
            Urgency::Medium => 3,
            Urgency::Low => 4,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Strategy as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub kind: StrategyKind,
    pub symbols: Vec<String>,
    pub max_order_size: f64,
    pub min_spread: f64,
    pub max_position_size: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub total_trades: u64,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    #[serde(skip)]
    wins: u64,
    #[serde(skip)]
    cumulative_pnl: f64,
    #[serde(skip)]
    peak_pnl: f64,
    #[serde(skip)]
    pnl_m2: f64,
}

impl Performance {
    /// Folds one resolved trade into the counters.
    pub fn record(&mut self, pnl: f64, success: bool) {
        self.total_trades += 1;
        if success {
            self.wins += 1;
        }
        let n = self.total_trades as f64;
        self.win_rate = self.wins as f64 / n;

        let delta = pnl - self.avg_profit;
        self.avg_profit += delta / n;
        self.pnl_m2 += delta * (pnl - self.avg_profit);
        self.sharpe_ratio = if self.total_trades > 1 {
            let std_dev = (self.pnl_m2 / (n - 1.0)).sqrt();
            if std_dev > f64::EPSILON {
                self.avg_profit / std_dev
            } else {
                0.0
            }
        } else {
            0.0
        };

        self.cumulative_pnl += pnl;
        self.peak_pnl = self.peak_pnl.max(self.cumulative_pnl);
        self.max_drawdown = self.max_drawdown.max(self.peak_pnl - self.cumulative_pnl);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub kind: StrategyKind,
    pub symbols: Vec<String>,
    pub max_order_size: f64,
    pub min_spread: f64,
    pub max_position_size: f64,
    pub enabled: bool,
    pub performance: Performance,
}

impl From<StrategyDefinition> for Strategy {
    fn from(def: StrategyDefinition) -> Self {
        Self {
            id: def.id,
            kind: def.kind,
            symbols: def.symbols,
            max_order_size: def.max_order_size,
            min_spread: def.min_spread,
            max_position_size: def.max_position_size,
            enabled: def.enabled,
            performance: Performance::default(),
        }
    }
}

impl Strategy {
    pub fn trades(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub strategy: String,
    pub exchange: String,
    pub symbol: String,
    pub action: Action,
    pub price: f64,
    pub size: f64,
    confidence: f64,
    pub urgency: Urgency,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl Signal {
    pub fn new(strategy: &str, book: &OrderBook, action: Action, price: f64, size: f64) -> Self {
        Self {
            strategy: strategy.to_string(),
            exchange: book.exchange.clone(),
            symbol: book.symbol.clone(),
            action,
            price,
            size,
            confidence: 0.0,
            urgency: Urgency::Low,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Always lands in `[0, 1]`; NaN becomes 0.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
    }

    pub fn priority(&self) -> u8 {
        self.urgency.priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::types::Level;

    fn book() -> OrderBook {
        OrderBook::new("binance", "BTC/USDT", vec![Level::new(100.0, 1.0, 1)], vec![])
    }

    #[test]
    fn confidence_is_clamped() {
        let signal = Signal::new("s", &book(), Action::Buy, 100.0, 1.0).with_confidence(1.7);
        assert_eq!(signal.confidence(), 1.0);
        let signal = signal.with_confidence(-0.3);
        assert_eq!(signal.confidence(), 0.0);
        let signal = signal.with_confidence(f64::NAN);
        assert_eq!(signal.confidence(), 0.0);
    }

    #[test]
    fn urgency_ranks() {
        assert_eq!(Urgency::Critical.priority(), 1);
        assert_eq!(Urgency::High.priority(), 2);
        assert_eq!(Urgency::Medium.priority(), 3);
        assert_eq!(Urgency::Low.priority(), 4);
    }

    #[test]
    fn performance_tracks_win_rate_and_drawdown() {
        let mut perf = Performance::default();
        perf.record(2.0, true);
        perf.record(-1.0, false);
        perf.record(-0.5, false);
        perf.record(1.5, true);

        assert_eq!(perf.total_trades, 4);
        assert!((perf.win_rate - 0.5).abs() < 1e-12);
        assert!((perf.avg_profit - 0.5).abs() < 1e-12);
        assert!((perf.max_drawdown - 1.5).abs() < 1e-12);
        assert!(perf.sharpe_ratio > 0.0);
    }

    #[test]
    fn definition_deserializes_with_enabled_default() {
        let def: StrategyDefinition = serde_json::from_str(
            r#"{"id":"mm","kind":"market_making","symbols":["BTC/USDT"],
                "max_order_size":1.0,"min_spread":0.001,"max_position_size":5.0}"#,
        )
        .unwrap();
        let strategy = Strategy::from(def);
        assert!(strategy.enabled);
        assert_eq!(strategy.kind, StrategyKind::MarketMaking);
        assert!(strategy.trades("BTC/USDT"));
    }
}
