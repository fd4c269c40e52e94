use thiserror::Error;

/// Errors surfaced by the orchestrator library
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown candle size: {0}")]
    UnknownCandleSize(String),

    #[error("trader for {0} is already running")]
    AlreadyRunning(String),

    #[error("trader for {0} is not running")]
    NotRunning(String),

    #[error("manager halted: {0}")]
    Halted(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for OrchestratorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        OrchestratorError::WebSocket(err.to_string())
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(err: config::ConfigError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}

impl OrchestratorError {
    /// Transient failures are retried by the caller on its next tick
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestratorError::Http(_)
            | OrchestratorError::WebSocket(_)
            | OrchestratorError::Timeout(_) => true,
            OrchestratorError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
