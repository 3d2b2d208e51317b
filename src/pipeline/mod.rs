//! The pipeline facade: wires ingestion, analysis, strategies and execution together and
//! exposes the read/toggle operations used by the dashboard layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::types::{BookUpdate, OrderBook};
use crate::aggregator::{ConnectionManager, FeedConnector, SimulatedConnector, Venue, WebSocketConnector};
use crate::analysis::{AnalysisPool, DetectionParams, PoolSettings, PriceObservation};
use crate::arbitrage::{ArbitrageOpportunity, ArbitrageTracker};
use crate::config::{FeedMode, PipelineConfig};
use crate::error::Result;
use crate::executor::{ExecutionModel, SignalExecutor, SimulatedExecution};
use crate::latency::{HttpProbe, LatencyMetrics, LatencyMonitor, LatencyProbe, SimulatedProbe};
use crate::strategy::types::Strategy;
use crate::strategy::{MarketView, PerformanceSummary, StrategyEngine};

const UPDATE_QUEUE: usize = 1024;

struct Running {
    connections: ConnectionManager,
    pool: Arc<AnalysisPool>,
    control: JoinHandle<()>,
    probe_loop: JoinHandle<()>,
    started_at: Instant,
}

/// State shared by every in-flight update.
struct ControlContext {
    store: crate::store::OrderBookStore,
    engine: StrategyEngine,
    latency: LatencyMonitor,
    arbitrage: ArbitrageTracker,
    executor: SignalExecutor,
    pool: Arc<AnalysisPool>,
    active: Arc<AtomicBool>,
}

pub struct HftPipeline {
    config: PipelineConfig,
    connector: Arc<dyn FeedConnector>,
    probe: Arc<dyn LatencyProbe>,
    store: crate::store::OrderBookStore,
    engine: StrategyEngine,
    latency: LatencyMonitor,
    arbitrage: ArbitrageTracker,
    executor: SignalExecutor,
    active: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl HftPipeline {
    /// Builds the pipeline with the connector, probe and execution model implied by
    /// `config.feed`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let (connector, probe): (Arc<dyn FeedConnector>, Arc<dyn LatencyProbe>) = match config.feed {
            FeedMode::Simulated => (
                Arc::new(SimulatedConnector::default()),
                Arc::new(SimulatedProbe),
            ),
            FeedMode::Live => (
                Arc::new(WebSocketConnector),
                Arc::new(HttpProbe::new(config.latency.probe_timeout())?),
            ),
        };
        let execution = Arc::new(SimulatedExecution::from(&config.executor));
        Ok(Self::with_components(config, connector, probe, execution))
    }

    pub fn with_components(
        config: PipelineConfig,
        connector: Arc<dyn FeedConnector>,
        probe: Arc<dyn LatencyProbe>,
        execution: Arc<dyn ExecutionModel>,
    ) -> Self {
        let engine = StrategyEngine::new(config.strategies.clone(), config.strategy_params.clone());
        let latency = LatencyMonitor::new();
        let executor = SignalExecutor::new(engine.clone(), latency.clone(), execution);
        Self {
            arbitrage: ArbitrageTracker::new(config.analysis.max_opportunities),
            store: crate::store::OrderBookStore::new(),
            config,
            connector,
            probe,
            engine,
            latency,
            executor,
            active: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    /// Connects every configured pair and starts the latency monitor. A no-op while active.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("Pipeline already active");
            return Ok(());
        }

        let pool = Arc::new(AnalysisPool::start(PoolSettings {
            workers: self.config.analysis.workers,
            depth: self.config.analysis.depth,
            detection: DetectionParams {
                threshold_pct: self.config.analysis.opportunity_threshold_pct,
                ttl: ChronoDuration::milliseconds(self.config.analysis.opportunity_ttl_ms as i64),
            },
            slippage_per_ms: self.config.executor.slippage_per_ms,
        })?);

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE);
        let connections = ConnectionManager::new(
            self.connector.clone(),
            self.store.clone(),
            self.latency.clone(),
            updates_tx,
            self.config.reconnect.clone(),
            self.active.clone(),
        );

        self.active.store(true, Ordering::SeqCst);
        for (exchange, symbol) in self.config.pairs() {
            if let Err(e) = connections.connect(&exchange, &symbol) {
                warn!(exchange = %exchange, symbol = %symbol, "Skipping pair: {}", e);
            }
        }

        let context = Arc::new(ControlContext {
            store: self.store.clone(),
            engine: self.engine.clone(),
            latency: self.latency.clone(),
            arbitrage: self.arbitrage.clone(),
            executor: self.executor.clone(),
            pool: pool.clone(),
            active: self.active.clone(),
        });
        let control = tokio::spawn(control_loop(context, updates_rx));

        let venues: Vec<Venue> = self
            .config
            .exchanges()
            .iter()
            .filter_map(|name| Venue::from_name(name).ok())
            .collect();
        let probe_loop = self.latency.spawn_probe_loop(
            venues,
            self.probe.clone(),
            self.config.latency.probe_interval(),
            self.config.latency.probe_timeout(),
        );

        info!(pairs = self.config.pairs().len(), "Pipeline started");
        *running = Some(Running {
            connections,
            pool,
            control,
            probe_loop,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Closes all streams, terminates the workers and the latency monitor. Signals already
    /// handed to the executor still run to completion.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.connections.stop_all();
        running.pool.shutdown();
        running.control.abort();
        running.probe_loop.abort();
        info!("Pipeline stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn get_strategies(&self) -> Vec<Strategy> {
        self.engine.strategies()
    }

    pub fn update_strategy_status(&self, strategy_id: &str, enabled: bool) -> Result<()> {
        self.engine.update_strategy_status(strategy_id, enabled)
    }

    pub fn get_order_books(&self) -> HashMap<String, OrderBook> {
        self.store.all()
    }

    pub fn get_latency_metrics(&self) -> HashMap<String, LatencyMetrics> {
        self.latency.snapshot()
    }

    pub fn get_arbitrage_opportunities(&self) -> Vec<ArbitrageOpportunity> {
        self.arbitrage.opportunities()
    }

    pub fn get_performance_metrics(&self) -> PerformanceSummary {
        let uptime = self
            .running
            .lock()
            .as_ref()
            .map(|r| r.started_at.elapsed())
            .unwrap_or(Duration::ZERO);
        self.engine.performance_summary(uptime)
    }
}

impl Drop for HftPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn control_loop(context: Arc<ControlContext>, mut updates: mpsc::Receiver<BookUpdate>) {
    while let Some(update) = updates.recv().await {
        let context = context.clone();
        tokio::spawn(async move { context.process(update).await });
    }
    debug!("Control loop finished");
}

impl ControlContext {
    async fn process(&self, update: BookUpdate) {
        let book = update.book;

        let analysis = match self.pool.analyze_book(book.clone()).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                debug!(book = %book.key(), "No analysis for update: {}", e);
                None
            }
        };

        let others: Vec<PriceObservation> = self
            .store
            .by_symbol(&book.symbol)
            .iter()
            .filter(|other| other.exchange != book.exchange)
            .filter_map(PriceObservation::from_book)
            .collect();
        let reference_price = if others.is_empty() {
            None
        } else {
            Some(others.iter().map(|o| o.price).sum::<f64>() / others.len() as f64)
        };

        if let Some(local) = PriceObservation::from_book(&book) {
            if !others.is_empty() {
                let mut observations = others;
                observations.push(local);
                match self.pool.detect_opportunities(&book.symbol, observations).await {
                    Ok(found) if !found.is_empty() => {
                        debug!(symbol = %book.symbol, count = found.len(), "Arbitrage opportunities");
                        self.arbitrage.record(found);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(symbol = %book.symbol, "Opportunity detection failed: {}", e),
                }
            }
        }

        let view = MarketView::new(&book)
            .with_analysis(analysis.as_ref())
            .with_reference_price(reference_price);
        let signals = self.engine.generate_signals(&view);
        if signals.is_empty() || !self.active.load(Ordering::SeqCst) {
            return;
        }

        let batch = match self
            .pool
            .optimize_latency(signals.clone(), self.latency.network_latencies())
            .await
        {
            Ok(ordered) => ordered,
            Err(e) => {
                debug!(book = %book.key(), "Latency optimizer unavailable, dispatching as-is: {}", e);
                signals
            }
        };
        self.executor.dispatch(batch);
    }
}

#[cfg(test)]
mod tests;
