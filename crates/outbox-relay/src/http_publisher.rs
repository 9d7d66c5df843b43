//! HTTP publisher posting each record as a JSON envelope.

use crate::publisher::{PublishError, Publisher};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use outbox_store::{Header, OutboxRecord};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// HTTP publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpPublisherConfig {
    /// Base URL; records go to `{endpoint}/topics/{topic}`.
    pub endpoint: String,
    /// Optional bearer token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl HttpPublisherConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    fn base_url(&self) -> Result<Url, PublishError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| PublishError::Other(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        if url.cannot_be_a_base() {
            return Err(PublishError::Other(format!(
                "endpoint cannot carry a path: {}",
                self.endpoint
            )));
        }
        Ok(url)
    }

    /// The topic is encoded as a single path segment.
    fn topic_url(&self, topic: &str) -> Result<Url, PublishError> {
        let mut url = self.base_url()?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("topics").push(topic);
        }
        Ok(url)
    }
}

/// Wire body for one record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordEnvelope<'a> {
    id: i64,
    topic: &'a str,
    key: &'a str,
    /// Base64 payload; `null` marks a tombstone.
    payload: Option<String>,
    headers: &'a [Header],
    create_time: String,
}

impl<'a> RecordEnvelope<'a> {
    fn from_record(record: &'a OutboxRecord) -> Self {
        Self {
            id: record.id.0,
            topic: &record.topic,
            key: &record.key,
            payload: record.payload.as_ref().map(|p| BASE64.encode(p)),
            headers: &record.headers,
            create_time: record.create_time.to_rfc3339(),
        }
    }
}

/// Publisher delivering records over HTTP.
pub struct HttpPublisher {
    config: HttpPublisherConfig,
    client: Client,
}

impl HttpPublisher {
    /// Create a new HTTP publisher.
    pub fn new(config: HttpPublisherConfig) -> Result<Self, PublishError> {
        config.base_url()?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        let url = self.config.topic_url(&record.topic)?;

        debug!(url = %url, id = %record.id, "Publishing record");

        let mut request = self
            .client
            .post(url)
            .json(&RecordEnvelope::from_record(record));
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
