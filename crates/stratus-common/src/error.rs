//! Error types for Stratus.

use thiserror::Error;

use crate::types::TopicPartition;

/// Result type alias for Stratus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Stratus.
///
/// Broker-level error codes are translated into this taxonomy at the admin
/// client boundary; everything above it works in these terms only.
#[derive(Error, Debug)]
pub enum Error {
    /// A config or metadata read targeted an absent topic.
    #[error("topic does not exist: {0}")]
    TopicDoesNotExist(String),

    /// Topic creation raced with another creator.
    #[error("topic already exists: {0}")]
    TopicExists(String),

    /// The requested replication factor cannot be satisfied yet. Retriable:
    /// brokers may still be settling.
    #[error("invalid replication factor for topic: {topic}")]
    InvalidReplicationFactor { topic: String },

    /// A topic deletion is already underway and concurrent deletion is
    /// disabled.
    #[error("topic deletion already in progress, try again later")]
    DeletionUnderway,

    /// Offset reset was requested on a partition that was never subscribed.
    #[error("not subscribed to topic-partition: {0}")]
    UnsubscribedTopicPartition(TopicPartition),

    /// A deadline was exhausted before the broker confirmed the operation.
    #[error("{operation} timed out after {elapsed_ms} ms")]
    OperationTimedOut {
        operation: String,
        elapsed_ms: u64,
        #[source]
        cause: Option<Box<Error>>,
    },

    /// Shutdown was requested while waiting inside a retry cycle.
    #[error("{operation} interrupted by shutdown")]
    Interrupted {
        operation: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    /// Classified-transient broker fault (request timeout, leadership
    /// movement, transport hiccup). Safe to retry.
    #[error("transient broker error: {0}")]
    Transient(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any other broker or client error. Not retried; propagated unchanged.
    #[error("broker error: {0}")]
    Broker(String),
}

impl Error {
    /// Whether a retry loop may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::InvalidReplicationFactor { .. }
        )
    }

    pub fn timed_out(operation: impl Into<String>, elapsed_ms: u64, cause: Option<Error>) -> Self {
        Error::OperationTimedOut {
            operation: operation.into(),
            elapsed_ms,
            cause: cause.map(Box::new),
        }
    }

    pub fn interrupted(operation: impl Into<String>, cause: Option<Error>) -> Self {
        Error::Interrupted {
            operation: operation.into(),
            cause: cause.map(Box::new),
        }
    }

    /// Walks the cause chain looking for `TopicExists`. Retry wrappers hand
    /// back the terminal error; create recovery needs to see through it.
    pub fn is_caused_by_topic_exists(&self) -> bool {
        match self {
            Error::TopicExists(_) => true,
            Error::OperationTimedOut {
                cause: Some(cause), ..
            }
            | Error::Interrupted {
                cause: Some(cause), ..
            } => cause.is_caused_by_topic_exists(),
            _ => false,
        }
    }
}
