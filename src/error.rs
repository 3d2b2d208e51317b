#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Connection error on {exchange}: {reason}")]
    Connection { exchange: String, reason: String },

    #[error("Parse error from {exchange}: {reason}")]
    Parse { exchange: String, reason: String },

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Strategy not found: {0}")]
    UnknownStrategy(String),

    #[error("Exchange not supported: {0}")]
    UnknownExchange(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Analysis pool is shut down")]
    PoolClosed,
}

impl PipelineError {
    pub fn connection(exchange: &str, reason: impl ToString) -> Self {
        Self::Connection {
            exchange: exchange.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(exchange: &str, reason: impl ToString) -> Self {
        Self::Parse {
            exchange: exchange.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
