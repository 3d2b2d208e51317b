use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::{PipelineError, Result};
use crate::latency::LatencyMonitor;
use crate::strategy::types::{Action, Signal};
use crate::strategy::StrategyEngine;

/// Loss booked for a failed fill, as a fraction of the order's notional.
const FAILED_FILL_COST: f64 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub pnl: f64,
}

/// Decides how long a fill takes and how it resolves.
pub trait ExecutionModel: Send + Sync {
    fn delay(&self, signal: &Signal) -> Duration;
    fn settle(&self, signal: &Signal) -> Result<ExecutionOutcome>;
}

#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl From<&ExecutorConfig> for SimulatedExecution {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
        }
    }
}

impl ExecutionModel for SimulatedExecution {
    fn delay(&self, _signal: &Signal) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    fn settle(&self, signal: &Signal) -> Result<ExecutionOutcome> {
        if signal.price <= 0.0 || signal.size <= 0.0 {
            return Err(PipelineError::Execution(format!(
                "invalid order {}@{} for {}",
                signal.size, signal.price, signal.symbol
            )));
        }
        let mut rng = rand::thread_rng();
        let notional = signal.price * signal.size;
        let success = rng.gen_bool(0.5 + 0.4 * signal.confidence());
        let pnl = if success {
            notional * rng.gen_range(0.0001..0.002)
        } else {
            -notional * FAILED_FILL_COST
        };
        Ok(ExecutionOutcome { success, pnl })
    }
}

/// Simulated execution path. Each dispatched batch runs in priority order on its own task;
/// callers do not wait on it, and stopping the pipeline does not cancel it.
#[derive(Clone)]
pub struct SignalExecutor {
    engine: StrategyEngine,
    latency: LatencyMonitor,
    model: Arc<dyn ExecutionModel>,
}

impl SignalExecutor {
    pub fn new(engine: StrategyEngine, latency: LatencyMonitor, model: Arc<dyn ExecutionModel>) -> Self {
        Self {
            engine,
            latency,
            model,
        }
    }

    pub fn dispatch(&self, mut signals: Vec<Signal>) -> JoinHandle<()> {
        signals.sort_by_key(|s| s.priority());
        let executor = self.clone();
        tokio::spawn(async move {
            for signal in signals {
                executor.execute(signal).await;
            }
        })
    }

    async fn execute(&self, signal: Signal) {
        if signal.action == Action::Hold {
            return;
        }
        let started = Instant::now();
        tokio::time::sleep(self.model.delay(&signal)).await;

        let outcome = self.model.settle(&signal).unwrap_or_else(|e| {
            warn!(strategy = %signal.strategy, symbol = %signal.symbol, "Execution failed: {}", e);
            ExecutionOutcome {
                success: false,
                pnl: -(signal.price * signal.size).abs() * FAILED_FILL_COST,
            }
        });

        self.latency.record_execution(&signal.exchange, started.elapsed());
        self.engine
            .record_execution(&signal.strategy, outcome.pnl, outcome.success);
        debug!(
            strategy = %signal.strategy,
            exchange = %signal.exchange,
            symbol = %signal.symbol,
            action = ?signal.action,
            urgency = %signal.urgency,
            success = outcome.success,
            pnl = outcome.pnl,
            "Signal executed"
        );
    }
}
