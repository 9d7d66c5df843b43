//! SQLite binding backed by an r2d2 connection pool.
//!
//! WAL mode lets readers proceed while a claim holds the write lock.
//! `busy_timeout` bounds how long any single statement waits on that lock,
//! and the pool's acquisition timeout bounds waiting for a connection.

use crate::queries::{self, Statements};
use crate::{
    ClaimEligibility, LeaderId, MutationOutcome, OutboxId, OutboxRecord, OutboxStore, StoreError,
    StoreResult,
};
use parking_lot::RwLock;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default outbox table name.
pub const DEFAULT_TABLE: &str = "outbox";

/// Configuration for the SQLite binding.
#[derive(Debug, Clone)]
pub struct SqliteBindingConfig {
    /// Outbox table name (plain identifier).
    pub table: String,
    /// Rule deciding which claimed rows may be taken over.
    pub eligibility: ClaimEligibility,
    /// Maximum connections in the pool.
    pub pool_size: u32,
    /// Connection acquisition timeout.
    pub connection_timeout: Duration,
    /// How long a statement waits on a locked database.
    pub busy_timeout: Duration,
    /// Create the table if it does not exist.
    pub create_schema: bool,
}

impl SqliteBindingConfig {
    pub fn new(eligibility: ClaimEligibility) -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            eligibility,
            pool_size: 2,
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            create_schema: false,
        }
    }
}

type Conn = PooledConnection<SqliteConnectionManager>;

/// Outbox binding over a SQLite database file.
pub struct SqliteBinding {
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
    statements: Statements,
    eligibility: ClaimEligibility,
    table: String,
    path: String,
}

impl SqliteBinding {
    /// Open the binding at the given path.
    ///
    /// This will:
    /// - Validate the table name and build statement texts
    /// - Open the pool with WAL mode and busy timeout pragmas
    /// - Optionally create the outbox table
    /// - Prepare every statement once
    ///
    /// Any failure drops whatever was already acquired before returning.
    pub fn open(path: &Path, config: SqliteBindingConfig) -> StoreResult<Self> {
        let statements = Statements::new(&config.table, config.eligibility)?;

        if config.pool_size == 0 {
            return Err(StoreError::InvalidConfig("pool_size must be positive".to_string()));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        let busy_timeout_ms = config.busy_timeout.as_millis();

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch(&format!(
                "
                PRAGMA busy_timeout = {busy_timeout_ms};
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "
            ))
        });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(0))
            .connection_timeout(config.connection_timeout)
            .build(manager)?;

        {
            let conn = pool.get()?;
            if config.create_schema {
                queries::ensure_schema(&conn, &config.table)?;
            }
            statements.check(&conn)?;
        }

        info!(
            path = %path_str,
            table = %config.table,
            pool_size = config.pool_size,
            eligibility = ?config.eligibility,
            "Outbox binding opened"
        );

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            statements,
            eligibility: config.eligibility,
            table: config.table,
            path: path_str,
        })
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the outbox table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Get a pooled connection, for upstream writes and inspection.
    pub fn connection(&self) -> StoreResult<Conn> {
        let pool = self.pool.read().clone().ok_or(StoreError::Disposed)?;
        Ok(pool.get()?)
    }

    /// Check the pool is healthy by acquiring a connection and querying.
    pub fn health_check(&self) -> StoreResult<()> {
        let conn = self.connection()?;
        conn.execute_batch("SELECT 1")?;
        debug!("Outbox binding health check passed");
        Ok(())
    }
}

impl OutboxStore for SqliteBinding {
    fn claim(&self, leader: &LeaderId, limit: usize) -> StoreResult<Vec<OutboxRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let records = queries::claim(&mut conn, &self.statements, self.eligibility, leader, limit)?;
        debug!(leader = %leader, limit, claimed = records.len(), "Claimed outbox records");
        Ok(records)
    }

    fn remove(&self, id: OutboxId) -> StoreResult<MutationOutcome> {
        let conn = self.connection()?;
        queries::remove(&conn, &self.statements, id)
    }

    fn release(&self, id: OutboxId) -> StoreResult<MutationOutcome> {
        let conn = self.connection()?;
        queries::release(&conn, &self.statements, id)
    }

    fn dispose(&self) {
        if self.pool.write().take().is_some() {
            info!(path = %self.path, "Outbox binding disposed");
        }
    }
}
