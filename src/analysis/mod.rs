//! Analysis worker pool.
//!
//! A fixed set of OS threads drains a shared job queue. Every job carries its inputs by value
//! and answers on its own oneshot channel, so the async control path never shares memory with
//! a worker and never blocks on one. A failing or panicking task answers with an error and
//! the worker moves on to the next job.

pub mod latency;
pub mod opportunity;
pub mod orderbook;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::aggregator::types::OrderBook;
use crate::arbitrage::ArbitrageOpportunity;
use crate::error::{PipelineError, Result};
use crate::strategy::types::Signal;

pub use latency::optimize_signals;
pub use opportunity::{detect_opportunities, DetectionParams, PriceObservation};
pub use orderbook::{analyze_order_book, BookAnalysis};

const QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub workers: usize,
    pub depth: usize,
    pub detection: DetectionParams,
    pub slippage_per_ms: f64,
}

enum Job {
    AnalyzeBook {
        book: OrderBook,
        reply: oneshot::Sender<Result<BookAnalysis>>,
    },
    DetectOpportunities {
        symbol: String,
        observations: Vec<PriceObservation>,
        reply: oneshot::Sender<Result<Vec<ArbitrageOpportunity>>>,
    },
    OptimizeLatency {
        signals: Vec<Signal>,
        latencies_ms: HashMap<String, f64>,
        reply: oneshot::Sender<Result<Vec<Signal>>>,
    },
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::AnalyzeBook { .. } => "analyze_book",
            Job::DetectOpportunities { .. } => "detect_opportunities",
            Job::OptimizeLatency { .. } => "optimize_latency",
        }
    }
}

pub struct AnalysisPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AnalysisPool {
    pub fn start(settings: PoolSettings) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded::<Job>(QUEUE_CAPACITY);
        let mut workers = Vec::with_capacity(settings.workers);
        for id in 0..settings.workers.max(1) {
            let receiver = receiver.clone();
            let settings = settings.clone();
            let handle = thread::Builder::new()
                .name(format!("analysis-{}", id))
                .spawn(move || worker_loop(id, receiver, settings))
                .map_err(|e| PipelineError::Worker(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }
        debug!(workers = workers.len(), "Analysis pool started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(PipelineError::PoolClosed)?;
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => {
                PipelineError::Worker(format!("queue full, dropped {}", job.name()))
            }
            TrySendError::Disconnected(_) => PipelineError::PoolClosed,
        })
    }

    async fn request<T>(&self, job: Job, reply: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.submit(job)?;
        reply
            .await
            .map_err(|_| PipelineError::Worker("worker dropped the request".to_string()))?
    }

    pub async fn analyze_book(&self, book: OrderBook) -> Result<BookAnalysis> {
        let (reply, rx) = oneshot::channel();
        self.request(Job::AnalyzeBook { book, reply }, rx).await
    }

    pub async fn detect_opportunities(
        &self,
        symbol: &str,
        observations: Vec<PriceObservation>,
    ) -> Result<Vec<ArbitrageOpportunity>> {
        let (reply, rx) = oneshot::channel();
        let job = Job::DetectOpportunities {
            symbol: symbol.to_string(),
            observations,
            reply,
        };
        self.request(job, rx).await
    }

    pub async fn optimize_latency(
        &self,
        signals: Vec<Signal>,
        latencies_ms: HashMap<String, f64>,
    ) -> Result<Vec<Signal>> {
        let (reply, rx) = oneshot::channel();
        let job = Job::OptimizeLatency {
            signals,
            latencies_ms,
            reply,
        };
        self.request(job, rx).await
    }

    /// Closes the queue. Workers finish the job in hand and exit.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            debug!("Analysis pool shutting down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Blocks until every worker thread has exited. Call after `shutdown`.
    pub fn join(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                error!("Analysis worker exited by panic");
            }
        }
    }
}

impl Drop for AnalysisPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, receiver: Receiver<Job>, settings: PoolSettings) {
    for job in receiver.iter() {
        let name = job.name();
        match job {
            Job::AnalyzeBook { book, reply } => {
                let outcome = guarded(id, name, || analyze_order_book(&book, settings.depth));
                let _ = reply.send(outcome);
            }
            Job::DetectOpportunities {
                symbol,
                observations,
                reply,
            } => {
                let outcome = guarded(id, name, || {
                    Ok(detect_opportunities(&symbol, &observations, &settings.detection))
                });
                let _ = reply.send(outcome);
            }
            Job::OptimizeLatency {
                signals,
                latencies_ms,
                reply,
            } => {
                let outcome = guarded(id, name, move || {
                    Ok(optimize_signals(signals, &latencies_ms, settings.slippage_per_ms))
                });
                let _ = reply.send(outcome);
            }
        }
    }
    debug!(worker = id, "Analysis worker stopped");
}

/// Runs one task, turning both errors and panics into a logged `PipelineError::Worker`.
fn guarded<T>(worker: usize, task: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(worker, task, "Analysis task failed: {}", e);
            Err(e)
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(worker, task, "Analysis task panicked: {}", reason);
            Err(PipelineError::Worker(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::types::Level;
    use crate::strategy::types::{Action, Urgency};
    use chrono::Duration;

    fn settings() -> PoolSettings {
        PoolSettings {
            workers: 2,
            depth: 10,
            detection: DetectionParams {
                threshold_pct: 0.05,
                ttl: Duration::seconds(5),
            },
            slippage_per_ms: 0.0,
        }
    }

    fn book(bid: Option<f64>, ask: Option<f64>) -> OrderBook {
        OrderBook::new(
            "binance",
            "BTC/USDT",
            bid.map(|p| vec![Level::new(p, 1.0, 1)]).unwrap_or_default(),
            ask.map(|p| vec![Level::new(p, 1.0, 1)]).unwrap_or_default(),
        )
    }

    #[tokio::test]
    async fn failed_task_does_not_stop_the_pool() {
        let pool = AnalysisPool::start(settings()).unwrap();
        assert!(pool.analyze_book(book(Some(100.0), None)).await.is_err());
        let analysis = pool.analyze_book(book(Some(100.0), Some(100.2))).await.unwrap();
        assert!((analysis.mid_price - 100.1).abs() < 1e-9);
    }

    #[test]
    fn panicking_task_is_reported_as_worker_error() {
        let outcome: Result<()> = guarded(0, "test", || panic!("boom"));
        assert!(matches!(outcome, Err(PipelineError::Worker(reason)) if reason == "boom"));
    }

    #[tokio::test]
    async fn tasks_run_concurrently_through_the_queue() {
        let pool = AnalysisPool::start(settings()).unwrap();
        let observations = vec![
            PriceObservation {
                exchange: "a".to_string(),
                price: 100.0,
                volume: 1.0,
            },
            PriceObservation {
                exchange: "b".to_string(),
                price: 100.2,
                volume: 1.0,
            },
        ];
        let b = book(Some(100.0), Some(100.2));
        let signals = vec![
            Signal::new("s", &b, Action::Buy, 100.0, 1.0).with_urgency(Urgency::Low),
            Signal::new("s", &b, Action::Sell, 100.0, 1.0).with_urgency(Urgency::Critical),
        ];
        let (analysis, opportunities, ordered) = tokio::join!(
            pool.analyze_book(b.clone()),
            pool.detect_opportunities("BTC/USDT", observations),
            pool.optimize_latency(signals, HashMap::new()),
        );
        assert!(analysis.is_ok());
        assert_eq!(opportunities.unwrap().len(), 1);
        assert_eq!(ordered.unwrap()[0].urgency, Urgency::Critical);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let pool = AnalysisPool::start(settings()).unwrap();
        pool.shutdown();
        assert!(!pool.is_running());
        assert!(matches!(
            pool.analyze_book(book(Some(1.0), Some(2.0))).await,
            Err(PipelineError::PoolClosed)
        ));
        pool.join();
    }
}
