use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::HftPipeline;
use crate::aggregator::testing::ChannelConnector;
use crate::aggregator::Venue;
use crate::config::{AnalysisConfig, ExecutorConfig, LatencyConfig, PipelineConfig, VenueConfig};
use crate::error::{PipelineError, Result as PipelineResult};
use crate::executor::{ExecutionModel, ExecutionOutcome};
use crate::latency::LatencyProbe;
use crate::strategy::types::{Action, Signal, StrategyDefinition, StrategyKind, Urgency};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct StaticProbe;

#[async_trait]
impl LatencyProbe for StaticProbe {
    async fn probe(&self, _venue: Venue) -> PipelineResult<Duration> {
        Ok(Duration::ZERO)
    }
}

/// Fills instantly and keeps every signal it was handed.
#[derive(Default)]
struct Recording {
    filled: Mutex<Vec<Signal>>,
}

impl Recording {
    fn filled(&self) -> Vec<Signal> {
        self.filled.lock().clone()
    }
}

impl ExecutionModel for Recording {
    fn delay(&self, _signal: &Signal) -> Duration {
        Duration::ZERO
    }

    fn settle(&self, signal: &Signal) -> PipelineResult<ExecutionOutcome> {
        self.filled.lock().push(signal.clone());
        Ok(ExecutionOutcome {
            success: true,
            pnl: 0.5,
        })
    }
}

fn strategy(id: &str, kind: StrategyKind, min_spread: f64) -> StrategyDefinition {
    StrategyDefinition {
        id: id.to_string(),
        kind,
        symbols: vec!["BTC/USDT".to_string()],
        max_order_size: 1.0,
        min_spread,
        max_position_size: 10.0,
        enabled: true,
    }
}

fn config(exchanges: &[&str], strategies: Vec<StrategyDefinition>) -> PipelineConfig {
    PipelineConfig {
        venues: exchanges
            .iter()
            .map(|exchange| VenueConfig {
                exchange: exchange.to_string(),
                symbols: vec!["BTC/USDT".to_string()],
            })
            .collect(),
        strategies,
        analysis: AnalysisConfig {
            workers: 2,
            ..AnalysisConfig::default()
        },
        executor: ExecutorConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            slippage_per_ms: 0.0,
        },
        latency: LatencyConfig {
            probe_interval_ms: 50,
            probe_timeout_ms: 50,
        },
        ..PipelineConfig::default()
    }
}

struct Harness {
    pipeline: HftPipeline,
    connector: Arc<ChannelConnector>,
    model: Arc<Recording>,
}

fn harness(config: PipelineConfig) -> Harness {
    init_logging();
    let connector = Arc::new(ChannelConnector::default());
    let model = Arc::new(Recording::default());
    let pipeline = HftPipeline::with_components(
        config,
        connector.clone(),
        Arc::new(StaticProbe),
        model.clone(),
    );
    Harness {
        pipeline,
        connector,
        model,
    }
}

/// Polls until the condition holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

const BINANCE_BOOK: &str = r#"{"E":1700000000000,"bids":[["100.0","1.0"]],"asks":[["100.2","1.0"]]}"#;

#[tokio::test]
async fn market_making_quotes_flow_through_to_execution() -> Result<()> {
    let h = harness(config(
        &["binance"],
        vec![strategy("mm", StrategyKind::MarketMaking, 0.001)],
    ));
    h.pipeline.start()?;
    assert!(eventually(|| h.connector.opens() == 1).await);

    h.connector.send(BINANCE_BOOK).await;
    assert!(eventually(|| h.model.filled().len() == 2).await);

    let filled = h.model.filled();
    info!("Filled signals: {:?}", filled);
    let buy = filled.iter().find(|s| s.action == Action::Buy).unwrap();
    let sell = filled.iter().find(|s| s.action == Action::Sell).unwrap();
    assert!((buy.price - 100.05).abs() < 1e-9);
    assert!((sell.price - 100.15).abs() < 1e-9);
    assert!(filled.iter().all(|s| s.urgency == Urgency::Medium));
    assert!(filled.iter().all(|s| s.strategy == "mm" && s.exchange == "binance"));
    assert!(buy.metadata.contains_key("latency_ms"));

    assert!(eventually(|| h.pipeline.get_performance_metrics().total_trades == 2).await);
    let books = h.pipeline.get_order_books();
    assert_eq!(books["binance:BTC/USDT"].best_ask().unwrap().price, 100.2);
    assert!(h.pipeline.get_latency_metrics().contains_key("binance"));

    h.pipeline.stop();
    Ok(())
}

#[tokio::test]
async fn cross_venue_spread_is_tracked() -> Result<()> {
    let h = harness(config(&["binance", "kraken"], vec![]));
    h.pipeline.start()?;
    assert!(eventually(|| h.connector.opens() == 2).await);

    h.connector
        .send_to(
            Venue::Binance,
            "BTC/USDT",
            r#"{"bids":[["99.99","2.0"]],"asks":[["100.01","2.0"]]}"#,
        )
        .await;
    assert!(eventually(|| h.pipeline.get_order_books().len() == 1).await);
    h.connector
        .send_to(
            Venue::Kraken,
            "BTC/USDT",
            r#"[0,{"bs":[["100.19","1.0","1700000000.0"]],"as":[["100.21","1.0","1700000000.0"]]},"book-10","XBT/USDT"]"#,
        )
        .await;

    assert!(eventually(|| !h.pipeline.get_arbitrage_opportunities().is_empty()).await);
    let opportunity = &h.pipeline.get_arbitrage_opportunities()[0];
    assert_eq!(opportunity.exchange1, "binance");
    assert_eq!(opportunity.exchange2, "kraken");
    assert!((opportunity.spread_percent - 0.2).abs() < 1e-6);
    assert!((opportunity.volume - 1.0).abs() < 1e-12);
    assert!(h.model.filled().is_empty());

    h.pipeline.stop();
    Ok(())
}

#[tokio::test]
async fn disabled_strategy_stops_emitting_until_reenabled() -> Result<()> {
    let h = harness(config(
        &["binance"],
        vec![strategy("mm", StrategyKind::MarketMaking, 0.001)],
    ));
    h.pipeline.start()?;
    assert!(eventually(|| h.connector.opens() == 1).await);

    h.pipeline.update_strategy_status("mm", false)?;
    h.connector.send(BINANCE_BOOK).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.model.filled().is_empty());
    assert_eq!(h.pipeline.get_performance_metrics().active_strategies, 0);

    h.pipeline.update_strategy_status("mm", true)?;
    h.connector.send(BINANCE_BOOK).await;
    assert!(eventually(|| h.model.filled().len() == 2).await);

    assert!(matches!(
        h.pipeline.update_strategy_status("ghost", true),
        Err(PipelineError::UnknownStrategy(_))
    ));
    h.pipeline.stop();
    Ok(())
}

#[tokio::test]
async fn start_and_stop_are_idempotent() -> Result<()> {
    let h = harness(config(&["binance", "coinbase"], vec![]));
    h.pipeline.start()?;
    h.pipeline.start()?;
    assert!(eventually(|| h.connector.opens() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.connector.opens(), 2);
    assert!(h.pipeline.is_active());

    h.connector.send(BINANCE_BOOK).await;
    assert!(eventually(|| !h.pipeline.get_order_books().is_empty()).await);

    h.pipeline.stop();
    h.pipeline.stop();
    assert!(!h.pipeline.is_active());
    assert_eq!(h.pipeline.get_performance_metrics().uptime_secs, 0);
    // Readers keep the last snapshot after a stop.
    assert_eq!(h.pipeline.get_order_books().len(), 1);

    h.pipeline.start()?;
    assert!(eventually(|| h.connector.opens() == 4).await);
    h.pipeline.stop();
    Ok(())
}

#[tokio::test]
async fn probe_loop_fills_latency_metrics() -> Result<()> {
    let h = harness(config(&["binance", "kraken"], vec![]));
    h.pipeline.start()?;
    assert!(
        eventually(|| {
            h.pipeline
                .get_latency_metrics()
                .values()
                .filter(|m| m.uptime == 100.0)
                .count()
                == 2
        })
        .await
    );
    h.pipeline.stop();
    Ok(())
}
