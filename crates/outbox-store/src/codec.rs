//! Record codec: raw persisted rows to structured records.
//!
//! Headers are persisted as two parallel JSON arrays (keys and values).
//! That layout is an encoding detail of this module; everything above it
//! sees an ordered `Vec<Header>`.

use crate::{CodecError, Header, LeaderId, OutboxId, OutboxRecord};
use chrono::{DateTime, Utc};
use rusqlite::Row;

/// A row exactly as read from the outbox table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub id: i64,
    pub create_time_ms: i64,
    pub topic: String,
    pub key: String,
    pub payload: Option<Vec<u8>>,
    pub header_keys: String,
    pub header_values: String,
    pub claimant_id: Option<String>,
}

impl RawRow {
    /// Column order matches `crate::queries::RECORD_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            create_time_ms: row.get(1)?,
            topic: row.get(2)?,
            key: row.get(3)?,
            payload: row.get(4)?,
            header_keys: row.get(5)?,
            header_values: row.get(6)?,
            claimant_id: row.get(7)?,
        })
    }
}

/// Decode one raw row.
///
/// Fails without producing a partial record when the header sequences
/// disagree in length or any field is structurally invalid.
pub fn decode(raw: RawRow) -> Result<OutboxRecord, CodecError> {
    let keys = parse_string_array(&raw.header_keys)?;
    let values = parse_string_array(&raw.header_values)?;
    let headers = pair_headers(keys, values)?;

    let create_time = DateTime::<Utc>::from_timestamp_millis(raw.create_time_ms)
        .ok_or(CodecError::InvalidTimestamp(raw.create_time_ms))?;

    let claimant = raw.claimant_id.map(LeaderId::new).transpose()?;

    Ok(OutboxRecord {
        id: OutboxId(raw.id),
        create_time,
        topic: raw.topic,
        key: raw.key,
        payload: raw.payload,
        headers,
        claimant,
    })
}

/// Pair parallel key/value sequences positionally, preserving order.
pub fn pair_headers(keys: Vec<String>, values: Vec<String>) -> Result<Vec<Header>, CodecError> {
    if keys.len() != values.len() {
        return Err(CodecError::HeaderLengthMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    Ok(keys
        .into_iter()
        .zip(values)
        .map(|(key, value)| Header { key, value })
        .collect())
}

/// Split headers into the two persisted JSON arrays.
pub fn encode_headers(headers: &[Header]) -> Result<(String, String), CodecError> {
    let keys: Vec<&str> = headers.iter().map(|h| h.key.as_str()).collect();
    let values: Vec<&str> = headers.iter().map(|h| h.value.as_str()).collect();
    let keys = serde_json::to_string(&keys).map_err(|e| CodecError::HeaderEncoding(e.to_string()))?;
    let values =
        serde_json::to_string(&values).map_err(|e| CodecError::HeaderEncoding(e.to_string()))?;
    Ok((keys, values))
}

fn parse_string_array(s: &str) -> Result<Vec<String>, CodecError> {
    serde_json::from_str(s).map_err(|e| CodecError::HeaderEncoding(e.to_string()))
}
