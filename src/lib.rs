pub mod aggregator;
pub mod analysis;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod executor;
pub mod latency;
pub mod pipeline;
pub mod store;
pub mod strategy;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::HftPipeline;
