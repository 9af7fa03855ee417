use std::time::Duration;

use thiserror::Error;

/// Rejected input, detected before anything is queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("endpoint {endpoint} is not recognized in interface {interface}")]
    EndpointNotInInterface { interface: String, endpoint: String },

    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    #[error("unsupported HTTP method {0:?}; expected 'get' or 'post'")]
    UnsupportedMethod(String),

    #[error("Steam API key is not configured")]
    MissingCredential,

    #[error("Steam API key {0}")]
    InvalidCredential(&'static str),

    #[error("invalid base URL: {0}")]
    BaseUrl(String),
}

/// Failure of the outbound HTTP call itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Steam API returned HTTP {status}")]
    Status { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("invalid response format: expected a JSON object")]
    NotAnObject,

    #[error("transport panicked: {0}")]
    Panicked(String),
}

/// Everything a caller of the gateway can get back instead of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("daily rate limit reached: {used} / {limit}")]
    DailyQuotaExceeded { used: u32, limit: u32 },

    #[error("Steam API call failed: {0}")]
    Transport(#[from] TransportError),

    #[error("job {id} completed without a response or an error")]
    JobIncomplete { id: u64 },

    #[error("request queue is full ({depth} jobs pending)")]
    QueueFull { depth: usize },

    #[error("dispatcher is stopped")]
    Stopped,

    #[error("no result after waiting {0:?}")]
    Timeout(Duration),
}

/// Construction-time failures of the gateway and dispatcher.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load settings: {0}")]
    Settings(#[from] Box<figment::Error>),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<figment::Error> for InitError {
    fn from(err: figment::Error) -> Self {
        Self::Settings(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    #[error("dispatcher worker did not terminate within {timeout:?}")]
    WorkerTimeout { timeout: Duration },
}
