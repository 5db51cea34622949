//! Domain errors for the testlens reconciliation core.

use thiserror::Error;

/// Errors surfaced by the core and by the testing client port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InsightError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Consumer '{consumer}' failed: {message}")]
    Consumer { consumer: String, message: String },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl InsightError {
    /// Whether the error came from the transport to the testing server.
    ///
    /// The core never retries these on its own; callers decide.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }
}

pub type InsightResult<T> = Result<T, InsightError>;

impl From<serde_json::Error> for InsightError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error returned by a notification consumer.
///
/// Caught at the fan-out boundary and logged; it never reaches the emitter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConsumerError(pub String);

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ConsumerError> for InsightError {
    fn from(err: ConsumerError) -> Self {
        Self::Consumer {
            consumer: "unknown".to_string(),
            message: err.0,
        }
    }
}
