use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("FETCH_FAILED: {0}")]
    FetchFailed(String),
    #[error("PARSE_SKIPPED: {0}")]
    ParseSkipped(String),
    #[error("OUT_OF_RANGE: workspace {id} does not exist ({len} open)")]
    OutOfRange { id: usize, len: usize },
    #[error("POOL_EXHAUSTED: all {0} reload timers are in use")]
    PoolExhausted(usize),
    #[error("ALREADY_RUNNING: {0}")]
    AlreadyRunning(String),
    #[error("DECODE_ERROR: {0}")]
    Decode(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INVALID_QUERY: {0}")]
    InvalidQuery(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::FetchFailed(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
