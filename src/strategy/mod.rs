pub mod arbitrage;
pub mod market_making;
pub mod mean_reversion;
pub mod momentum;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::types::OrderBook;
use crate::analysis::BookAnalysis;
use crate::config::StrategyParams;
use crate::error::{PipelineError, Result};
use types::{Signal, Strategy, StrategyDefinition, StrategyKind};

/// Everything a strategy may look at for one order book update.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub book: &'a OrderBook,
    pub analysis: Option<&'a BookAnalysis>,
    /// Price of the same symbol on another venue.
    pub reference_price: Option<f64>,
}

impl<'a> MarketView<'a> {
    pub fn new(book: &'a OrderBook) -> Self {
        Self {
            book,
            analysis: None,
            reference_price: None,
        }
    }

    pub fn with_analysis(mut self, analysis: Option<&'a BookAnalysis>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_reference_price(mut self, price: Option<f64>) -> Self {
        self.reference_price = price;
        self
    }

    fn crossed(&self) -> bool {
        self.analysis.map_or_else(|| self.book.is_crossed(), |a| a.crossed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub uptime_secs: u64,
    pub total_trades: u64,
    pub avg_win_rate: f64,
    pub avg_sharpe: f64,
    pub active_strategies: usize,
    pub total_strategies: usize,
}

/// Owns the strategy registry. The enabled flag is read on every pass, so a disable lands
/// before the next batch of signals.
#[derive(Debug, Clone)]
pub struct StrategyEngine {
    strategies: Arc<RwLock<Vec<Strategy>>>,
    params: StrategyParams,
}

impl StrategyEngine {
    pub fn new(definitions: Vec<StrategyDefinition>, params: StrategyParams) -> Self {
        Self {
            strategies: Arc::new(RwLock::new(definitions.into_iter().map(Strategy::from).collect())),
            params,
        }
    }

    pub fn strategies(&self) -> Vec<Strategy> {
        self.strategies.read().clone()
    }

    pub fn update_strategy_status(&self, strategy_id: &str, enabled: bool) -> Result<()> {
        let mut strategies = self.strategies.write();
        let strategy = strategies
            .iter_mut()
            .find(|s| s.id == strategy_id)
            .ok_or_else(|| PipelineError::UnknownStrategy(strategy_id.to_string()))?;
        strategy.enabled = enabled;
        info!(strategy = %strategy_id, enabled, "Strategy status updated");
        Ok(())
    }

    pub fn generate_signals(&self, view: &MarketView<'_>) -> Vec<Signal> {
        if view.crossed() {
            debug!(book = %view.book.key(), "Skipping crossed book");
            return Vec::new();
        }
        let strategies = self.strategies.read();
        strategies
            .iter()
            .filter(|s| s.enabled && s.trades(&view.book.symbol))
            .flat_map(|strategy| match strategy.kind {
                StrategyKind::MarketMaking => market_making::evaluate(strategy, view, &self.params),
                StrategyKind::Arbitrage => arbitrage::evaluate(strategy, view, &self.params),
                StrategyKind::Momentum => momentum::evaluate(strategy, view, &self.params),
                StrategyKind::MeanReversion => mean_reversion::evaluate(strategy, view, &self.params),
            })
            .collect()
    }

    /// Folds an execution result into the originating strategy. Unknown ids are ignored so a
    /// strategy removed mid-flight cannot fail an execution.
    pub fn record_execution(&self, strategy_id: &str, pnl: f64, success: bool) {
        let mut strategies = self.strategies.write();
        if let Some(strategy) = strategies.iter_mut().find(|s| s.id == strategy_id) {
            strategy.performance.record(pnl, success);
        }
    }

    pub fn performance_summary(&self, uptime: Duration) -> PerformanceSummary {
        let strategies = self.strategies.read();
        let total = strategies.len();
        let mean = |f: fn(&Strategy) -> f64| {
            if total == 0 {
                0.0
            } else {
                strategies.iter().map(f).sum::<f64>() / total as f64
            }
        };
        PerformanceSummary {
            uptime_secs: uptime.as_secs(),
            total_trades: strategies.iter().map(|s| s.performance.total_trades).sum(),
            avg_win_rate: mean(|s| s.performance.win_rate),
            avg_sharpe: mean(|s| s.performance.sharpe_ratio),
            active_strategies: strategies.iter().filter(|s| s.enabled).count(),
            total_strategies: total,
        }
    }
}
