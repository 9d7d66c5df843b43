//! Relay configuration.
//!
//! Settings are read from a JSON file, then selected fields are overridden
//! from the environment.

use crate::error::{RelayError, RelayResult};
use crate::http_publisher::HttpPublisherConfig;
use outbox_store::{ClaimEligibility, LeaderId, SqliteBindingConfig, DEFAULT_TABLE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Relay loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum records claimed per cycle.
    pub batch_size: usize,
    /// Idle wait when not leader or when a cycle found less than a full batch.
    pub poll_interval_ms: u64,
    /// Deadline for each claim/remove/release call.
    pub store_timeout_ms: u64,
    /// Deadline for each publish call.
    pub publish_timeout_ms: u64,
    /// First delay after a failed cycle.
    pub io_backoff_initial_ms: u64,
    /// Upper bound for the doubling delay.
    pub io_backoff_max_ms: u64,
    /// After a record fails, release later records with the same key
    /// in that cycle instead of publishing them out of order.
    pub hold_key_order: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval_ms: 1000,
            store_timeout_ms: 10_000,
            publish_timeout_ms: 30_000,
            io_backoff_initial_ms: 500,
            io_backoff_max_ms: 30_000,
            hold_key_order: true,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> RelayResult<()> {
        let zero = [
            ("batch_size", self.batch_size as u64),
            ("poll_interval_ms", self.poll_interval_ms),
            ("store_timeout_ms", self.store_timeout_ms),
            ("publish_timeout_ms", self.publish_timeout_ms),
            ("io_backoff_initial_ms", self.io_backoff_initial_ms),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        if let Some((name, _)) = zero {
            return Err(RelayError::Config(format!("{name} must be positive")));
        }
        if self.io_backoff_max_ms < self.io_backoff_initial_ms {
            return Err(RelayError::Config(
                "io_backoff_max_ms must not be below io_backoff_initial_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Full process settings for the relay binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database holding the outbox table.
    pub database_path: PathBuf,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Takeover rule for rows claimed by another leader. Required.
    pub claim_eligibility: ClaimEligibility,

    /// Fixed leader token. A random one is generated when absent.
    #[serde(default)]
    pub leader_id: Option<LeaderId>,

    #[serde(default)]
    pub relay: RelayConfig,

    /// Downstream HTTP endpoint. Records are only logged when absent.
    #[serde(default)]
    pub publisher: Option<HttpPublisherConfig>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional JSONL log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_pool_size() -> u32 {
    2
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a file, then apply environment overrides.
    pub fn load(path: &Path) -> RelayResult<Self> {
        let mut settings = Self::load_from_file(path)?;
        settings.load_from_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> RelayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn load_from_env(&mut self) -> RelayResult<()> {
        if let Ok(log_level) = std::env::var("OUTBOX_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(path) = std::env::var("OUTBOX_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(token) = std::env::var("OUTBOX_LEADER_ID") {
            self.leader_id =
                Some(LeaderId::new(token).map_err(|e| RelayError::Config(e.to_string()))?);
        }
        Ok(())
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.pool_size == 0 {
            return Err(RelayError::Config("pool_size must be positive".to_string()));
        }
        self.relay.validate()
    }

    /// Binding configuration derived from these settings.
    pub fn binding_config(&self, create_schema: bool) -> SqliteBindingConfig {
        SqliteBindingConfig {
            table: self.table.clone(),
            pool_size: self.pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            create_schema,
            ..SqliteBindingConfig::new(self.claim_eligibility)
        }
    }
}
