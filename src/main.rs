use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use hft_pipeline::{HftPipeline, PipelineConfig};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

fn init_logging(config: &PipelineConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_dir {
        Some(dir) => {
            let file_appender = RollingFileAppender::new(Rotation::NEVER, dir, "pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .compact()
                .try_init();
            Some(guard)
        }
        None => {
            let _ = fmt().with_env_filter(filter).with_target(false).try_init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref())?;
    let _log_guard = init_logging(&config);

    info!(
        feed = ?config.feed,
        venues = config.venues.len(),
        strategies = config.strategies.len(),
        "Starting HFT pipeline"
    );
    let pipeline = HftPipeline::new(config)?;
    pipeline.start()?;

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    report.tick().await;
    loop {
        tokio::select! {
            _ = report.tick() => {
                let summary = pipeline.get_performance_metrics();
                info!(
                    uptime_secs = summary.uptime_secs,
                    trades = summary.total_trades,
                    win_rate = summary.avg_win_rate,
                    sharpe = summary.avg_sharpe,
                    active = summary.active_strategies,
                    books = pipeline.get_order_books().len(),
                    opportunities = pipeline.get_arbitrage_opportunities().len(),
                    "Pipeline status"
                );
                for (exchange, metrics) in pipeline.get_latency_metrics() {
                    info!(
                        exchange = %exchange,
                        network_ms = metrics.network_latency,
                        data_ms = metrics.data_latency,
                        jitter_ms = metrics.jitter,
                        uptime = metrics.uptime,
                        "Latency"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    pipeline.stop();
    Ok(())
}
