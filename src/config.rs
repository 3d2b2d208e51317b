use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregator::retry::RetryPolicy;
use crate::strategy::types::{StrategyDefinition, StrategyKind};

pub const CONFIG_ENV_VAR: &str = "HFT_PIPELINE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Simulated,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub exchange: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub workers: usize,
    /// Number of top levels summed for volume and imbalance.
    pub depth: usize,
    pub opportunity_threshold_pct: f64,
    pub opportunity_ttl_ms: u64,
    pub max_opportunities: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            depth: 10,
            opportunity_threshold_pct: 0.05,
            opportunity_ttl_ms: 5_000,
            max_opportunities: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Percent difference against the reference venue that triggers an arbitrage signal.
    pub arbitrage_threshold_pct: f64,
    pub momentum_threshold: f64,
    pub momentum_depth: usize,
    pub mean_reversion_threshold: f64,
    /// Fraction of the opposite side's top level quoted by market makers.
    pub quote_fraction: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            arbitrage_threshold_pct: 0.1,
            momentum_threshold: 0.2,
            momentum_depth: 5,
            mean_reversion_threshold: 0.4,
            quote_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Price correction applied per millisecond of venue latency.
    pub slippage_per_ms: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 50,
            slippage_per_ms: 0.000_01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1_000,
            probe_timeout_ms: 2_000,
        }
    }
}

impl LatencyConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub feed: FeedMode,
    pub venues: Vec<VenueConfig>,
    pub reconnect: RetryPolicy,
    pub analysis: AnalysisConfig,
    pub strategy_params: StrategyParams,
    pub strategies: Vec<StrategyDefinition>,
    pub executor: ExecutorConfig,
    pub latency: LatencyConfig,
    pub log_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let symbols = vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()];
        Self {
            feed: FeedMode::Simulated,
            venues: ["binance", "coinbase", "kraken"]
                .iter()
                .map(|exchange| VenueConfig {
                    exchange: exchange.to_string(),
                    symbols: symbols.clone(),
                })
                .collect(),
            reconnect: RetryPolicy::default(),
            analysis: AnalysisConfig::default(),
            strategy_params: StrategyParams::default(),
            strategies: default_strategies(&symbols),
            executor: ExecutorConfig::default(),
            latency: LatencyConfig::default(),
            log_dir: None,
        }
    }
}

fn default_strategies(symbols: &[String]) -> Vec<StrategyDefinition> {
    let seeds = [
        ("mm_1", StrategyKind::MarketMaking, 0.001),
        ("arb_1", StrategyKind::Arbitrage, 0.0005),
        ("mom_1", StrategyKind::Momentum, 0.0),
        ("mr_1", StrategyKind::MeanReversion, 0.0),
    ];
    seeds
        .iter()
        .map(|(id, kind, min_spread)| StrategyDefinition {
            id: id.to_string(),
            kind: *kind,
            symbols: symbols.to_vec(),
            max_order_size: 1.0,
            min_spread: *min_spread,
            max_position_size: 10.0,
            enabled: true,
        })
        .collect()
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then `HFT_PIPELINE_CONFIG`, then the user config dir, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.workers == 0 {
            anyhow::bail!("analysis.workers must be at least 1");
        }
        if self.executor.min_delay_ms > self.executor.max_delay_ms {
            anyhow::bail!("executor.min_delay_ms must not exceed executor.max_delay_ms");
        }
        if !self.executor.slippage_per_ms.is_finite() || self.executor.slippage_per_ms < 0.0 {
            anyhow::bail!("executor.slippage_per_ms must be a non-negative number");
        }
        for venue in &self.venues {
            crate::aggregator::venue::Venue::from_name(&venue.exchange)
                .with_context(|| format!("Invalid venue {}", venue.exchange))?;
        }
        Ok(())
    }

    /// Every configured `(exchange, symbol)` pair.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.venues
            .iter()
            .flat_map(|venue| {
                venue
                    .symbols
                    .iter()
                    .map(move |symbol| (venue.exchange.clone(), symbol.clone()))
            })
            .collect()
    }

    pub fn exchanges(&self) -> Vec<String> {
        self.venues.iter().map(|v| v.exchange.clone()).collect()
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hft_pipeline").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_venue_and_symbol() {
        let config = PipelineConfig::default();
        assert_eq!(config.pairs().len(), 6);
        assert_eq!(config.strategies.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"feed":"live","analysis":{"workers":2},"reconnect":{"fixed":{"delay_ms":250}}}"#,
        )
        .unwrap();
        assert_eq!(config.feed, FeedMode::Live);
        assert_eq!(config.analysis.workers, 2);
        assert_eq!(config.analysis.depth, 10);
        assert_eq!(config.reconnect, RetryPolicy::Fixed { delay_ms: 250 });
        assert_eq!(config.venues.len(), 3);
    }

    #[test]
    fn rejects_unknown_venue() {
        let mut config = PipelineConfig::default();
        config.venues.push(VenueConfig {
            exchange: "mtgox".to_string(),
            symbols: vec!["BTC/USD".to_string()],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_slippage() {
        let mut config = PipelineConfig::default();
        config.executor.slippage_per_ms = -0.01;
        assert!(config.validate().is_err());
        config.executor.slippage_per_ms = f64::NAN;
        assert!(config.validate().is_err());
    }
}
