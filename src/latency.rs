use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::aggregator::venue::Venue;
use crate::error::{PipelineError, Result};

/// Instant latency figures for one exchange, all in milliseconds. `uptime` is the percentage
/// of successful probes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub round_trip_time: f64,
    pub order_execution_time: f64,
    pub data_latency: f64,
    pub network_latency: f64,
    pub average_latency: f64,
    pub jitter: f64,
    pub uptime: f64,
}

const JITTER_SMOOTHING: f64 = 0.2;

#[derive(Debug, Default)]
struct ExchangeLatency {
    metrics: LatencyMetrics,
    probes_ok: u64,
    probes_total: u64,
    has_network_sample: bool,
}

impl ExchangeLatency {
    fn refresh_derived(&mut self) {
        let m = &mut self.metrics;
        m.round_trip_time = m.network_latency + m.order_execution_time;
        m.average_latency = (m.network_latency + m.data_latency + m.order_execution_time) / 3.0;
        if self.probes_total > 0 {
            m.uptime = self.probes_ok as f64 / self.probes_total as f64 * 100.0;
        }
    }
}

/// Connectivity check against one venue.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn probe(&self, venue: Venue) -> Result<Duration>;
}

/// Times a GET against the venue's public ping endpoint.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LatencyProbe for HttpProbe {
    async fn probe(&self, venue: Venue) -> Result<Duration> {
        let started = Instant::now();
        let response = self
            .client
            .get(venue.ping_url())
            .send()
            .await
            .map_err(|e| PipelineError::connection(venue.name(), e))?;
        if !response.status().is_success() {
            return Err(PipelineError::connection(
                venue.name(),
                format!("ping returned {}", response.status()),
            ));
        }
        Ok(started.elapsed())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedProbe;

#[async_trait]
impl LatencyProbe for SimulatedProbe {
    async fn probe(&self, venue: Venue) -> Result<Duration> {
        let base = match venue {
            Venue::Binance => 8.0,
            Venue::Coinbase => 15.0,
            Venue::Kraken => 22.0,
        };
        let ms: f64 = base + rand::thread_rng().gen_range(0.0..10.0);
        Ok(Duration::from_secs_f64(ms / 1000.0))
    }
}

/// Per-exchange latency figures. The probe loop owns `network_latency`, the connection
/// manager owns `data_latency` and the executor owns `order_execution_time`.
#[derive(Debug, Clone, Default)]
pub struct LatencyMonitor {
    exchanges: Arc<RwLock<HashMap<String, ExchangeLatency>>>,
}

impl LatencyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_network(&self, exchange: &str, sample: Duration) {
        let ms = sample.as_secs_f64() * 1000.0;
        let mut exchanges = self.exchanges.write();
        let entry = exchanges.entry(exchange.to_string()).or_default();
        if entry.has_network_sample {
            let delta = (ms - entry.metrics.network_latency).abs();
            entry.metrics.jitter += JITTER_SMOOTHING * (delta - entry.metrics.jitter);
        }
        entry.metrics.network_latency = ms;
        entry.has_network_sample = true;
        entry.refresh_derived();
    }

    pub fn record_probe(&self, exchange: &str, outcome: &Result<Duration>) {
        {
            let mut exchanges = self.exchanges.write();
            let entry = exchanges.entry(exchange.to_string()).or_default();
            entry.probes_total += 1;
            if outcome.is_ok() {
                entry.probes_ok += 1;
            }
            entry.refresh_derived();
        }
        match outcome {
            Ok(sample) => self.record_network(exchange, *sample),
            Err(e) => warn!(exchange = %exchange, "Latency probe failed: {}", e),
        }
    }

    pub fn record_data(&self, exchange: &str, sample: Duration) {
        let mut exchanges = self.exchanges.write();
        let entry = exchanges.entry(exchange.to_string()).or_default();
        entry.metrics.data_latency = sample.as_secs_f64() * 1000.0;
        entry.refresh_derived();
    }

    pub fn record_execution(&self, exchange: &str, sample: Duration) {
        let mut exchanges = self.exchanges.write();
        let entry = exchanges.entry(exchange.to_string()).or_default();
        entry.metrics.order_execution_time = sample.as_secs_f64() * 1000.0;
        entry.refresh_derived();
    }

    pub fn get(&self, exchange: &str) -> Option<LatencyMetrics> {
        self.exchanges.read().get(exchange).map(|e| e.metrics.clone())
    }

    pub fn snapshot(&self) -> HashMap<String, LatencyMetrics> {
        self.exchanges
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.metrics.clone()))
            .collect()
    }

    /// Network latency in ms per exchange, as consumed by the latency optimizer.
    pub fn network_latencies(&self) -> HashMap<String, f64> {
        self.exchanges
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.metrics.network_latency))
            .collect()
    }

    /// Probes every venue once per `interval` until the returned handle is aborted.
    pub fn spawn_probe_loop(
        &self,
        venues: Vec<Venue>,
        probe: Arc<dyn LatencyProbe>,
        interval: Duration,
        timeout: Duration,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let probes = venues.iter().map(|venue| {
                    let probe = probe.clone();
                    let venue = *venue;
                    async move {
                        let outcome = match tokio::time::timeout(timeout, probe.probe(venue)).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(PipelineError::connection(venue.name(), "probe timed out")),
                        };
                        (venue, outcome)
                    }
                });
                for (venue, outcome) in futures::future::join_all(probes).await {
                    monitor.record_probe(venue.name(), &outcome);
                }
                debug!("Latency probe round complete");
            }
        })
    }
}
