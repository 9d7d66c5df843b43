//! Error types for the outbox relay.

use crate::publisher::PublishError;
use outbox_store::StoreError;
use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Outbox store error, returned verbatim by the binding
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Downstream publisher error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// A store or publish call exceeded its deadline. The outcome is unknown.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Blocking task panicked or was cancelled
    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether this error leaves the outcome of the failed call unknown.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
