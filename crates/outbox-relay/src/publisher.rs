//! Downstream publisher seam.

use async_trait::async_trait;
use outbox_store::OutboxRecord;
use thiserror::Error;
use tracing::info;

/// Failure reported by a downstream publisher.
///
/// Any failure leads to the record being released for a later retry.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Downstream refused the record
    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Any other publisher-specific failure
    #[error("{0}")]
    Other(String),
}

/// Delivers one decoded record downstream.
///
/// Returning `Ok` confirms delivery and lets the relay remove the row.
/// Consumers must tolerate duplicates: a record may be delivered again
/// after a crash or a lost removal.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError>;
}

/// Dry-run publisher that logs and accepts every record.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        info!(
            id = %record.id,
            topic = %record.topic,
            key = %record.key,
            payload_bytes = record.payload.as_ref().map(|p| p.len()),
            headers = record.headers.len(),
            "Dry-run publish"
        );
        Ok(())
    }
}
