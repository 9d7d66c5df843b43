//! Standalone statement helpers that work with any Connection.
//!
//! The outbox table name is interpolated into statement text, so every
//! entry point expects a name already checked by [`validate_table_name`].

use crate::codec::{self, RawRow};
use crate::{
    ClaimEligibility, LeaderId, MutationOutcome, NewOutboxRecord, OutboxId, OutboxRecord,
    StoreError, StoreResult,
};
use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};

/// Columns returned by claim, in `RawRow::from_row` order.
pub const RECORD_COLUMNS: &str =
    "id, create_time, topic, key, payload, header_keys, header_values, claimant_id";

/// Reject anything but a plain SQL identifier.
pub fn validate_table_name(table: &str) -> StoreResult<()> {
    let mut chars = table.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidConfig(format!(
            "outbox table name {:?} is not a plain identifier",
            table
        )))
    }
}

/// Create the outbox table and its claimant index if absent.
pub fn ensure_schema(conn: &Connection, table: &str) -> StoreResult<()> {
    validate_table_name(table)?;
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            create_time INTEGER NOT NULL,
            topic TEXT NOT NULL,
            key TEXT NOT NULL,
            payload BLOB,
            header_keys TEXT NOT NULL DEFAULT '[]',
            header_values TEXT NOT NULL DEFAULT '[]',
            claimant_id TEXT,
            claimed_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_claimant ON {table}(claimant_id, claimed_at);
        "
    ))?;
    Ok(())
}

/// Prepared statement texts for one table and eligibility rule.
#[derive(Debug, Clone)]
pub struct Statements {
    pub claim: String,
    pub remove: String,
    pub release: String,
}

impl Statements {
    pub fn new(table: &str, eligibility: ClaimEligibility) -> StoreResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            claim: format!(
                "UPDATE {table} SET claimant_id = ?1, claimed_at = ?2
                 WHERE id IN (
                     SELECT id FROM {table}
                     WHERE {eligible}
                     ORDER BY id ASC
                     LIMIT ?3
                 )
                 RETURNING {RECORD_COLUMNS}",
                eligible = eligibility.predicate(),
            ),
            remove: format!("DELETE FROM {table} WHERE id = ?1"),
            release: format!(
                "UPDATE {table} SET claimant_id = NULL, claimed_at = NULL
                 WHERE id = ?1 AND claimant_id IS NOT NULL"
            ),
        })
    }

    /// Prepare every statement once so misconfiguration surfaces early.
    pub fn check(&self, conn: &Connection) -> StoreResult<()> {
        conn.prepare_cached(&self.claim)?;
        conn.prepare_cached(&self.remove)?;
        conn.prepare_cached(&self.release)?;
        Ok(())
    }
}

/// Insert a new record with no claimant.
///
/// Pass the caller's open transaction to make the write atomic with the
/// business change it describes.
pub fn insert_record(
    conn: &Connection,
    table: &str,
    record: &NewOutboxRecord,
) -> StoreResult<OutboxId> {
    validate_table_name(table)?;
    let (header_keys, header_values) = codec::encode_headers(&record.headers)?;
    conn.execute(
        &format!(
            "INSERT INTO {table} (create_time, topic, key, payload, header_keys, header_values)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![
            Utc::now().timestamp_millis(),
            record.topic,
            record.key,
            record.payload,
            header_keys,
            header_values,
        ],
    )?;
    Ok(OutboxId(conn.last_insert_rowid()))
}

/// Stamp up to `limit` eligible rows with `leader` and return them by id.
///
/// Runs in one IMMEDIATE transaction; a decode failure rolls the stamps back.
pub fn claim(
    conn: &mut Connection,
    statements: &Statements,
    eligibility: ClaimEligibility,
    leader: &LeaderId,
    limit: usize,
) -> StoreResult<Vec<OutboxRecord>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let now_ms = Utc::now().timestamp_millis();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let raw_rows = {
        let mut stmt = tx.prepare_cached(&statements.claim)?;
        let rows = match eligibility.cutoff_ms(now_ms) {
            Some(cutoff) => stmt.query_map(
                params![leader.as_str(), now_ms, limit, cutoff],
                RawRow::from_row,
            )?,
            None => stmt.query_map(params![leader.as_str(), now_ms, limit], RawRow::from_row)?,
        };
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut records = raw_rows
        .into_iter()
        .map(codec::decode)
        .collect::<Result<Vec<_>, _>>()?;

    tx.commit()?;

    // RETURNING order is unspecified
    records.sort_by_key(|r| r.id);
    Ok(records)
}

/// Delete one row by id.
pub fn remove(conn: &Connection, statements: &Statements, id: OutboxId) -> StoreResult<MutationOutcome> {
    let mut stmt = conn.prepare_cached(&statements.remove)?;
    let affected = stmt.execute(params![id.0])?;
    Ok(MutationOutcome::from_affected(affected))
}

/// Clear the claimant on one row by id.
pub fn release(
    conn: &Connection,
    statements: &Statements,
    id: OutboxId,
) -> StoreResult<MutationOutcome> {
    let mut stmt = conn.prepare_cached(&statements.release)?;
    let affected = stmt.execute(params![id.0])?;
    Ok(MutationOutcome::from_affected(affected))
}
