//! Store error types.

use thiserror::Error;

/// Structural errors raised while decoding a persisted row.
///
/// These signal corrupted data and are never tolerated silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Header key and value sequences differ in length
    #[error("unequal number of header keys ({keys}) and values ({values})")]
    HeaderLengthMismatch { keys: usize, values: usize },

    /// Header column is not a JSON array of strings
    #[error("malformed header encoding: {0}")]
    HeaderEncoding(String),

    /// create_time does not map to a representable instant
    #[error("invalid create_time: {0}")]
    InvalidTimestamp(i64),

    /// Leader identity was empty
    #[error("leader id must not be empty")]
    EmptyLeaderId,
}

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Row content failed structural validation
    #[error("Corrupt outbox row: {0}")]
    Codec(#[from] CodecError),

    /// Binding misconfiguration detected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The binding has been disposed
    #[error("Binding has been disposed")]
    Disposed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Pool(e.to_string())
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
