//! Outbox table binding for the transactional-outbox claim protocol.
//!
//! This crate provides:
//! - Model types for outbox records, leader identities and mutation outcomes
//! - The record codec turning persisted rows into structured records
//! - The backend-agnostic [`OutboxStore`] contract
//! - A SQLite binding with WAL mode and an r2d2 connection pool
//!
//! # Claim protocol
//!
//! ```text
//! UNCLAIMED --claim(leader)--> CLAIMED(leader) --remove--> REMOVED
//!                                     |
//!                                     +------release------> UNCLAIMED
//! ```
//!
//! A leader that dies mid-delivery leaves its rows claimed until the
//! configured [`ClaimEligibility`] lets another leader take them over.
//!
//! # Upstream writes
//!
//! Producers insert rows inside their own business transaction:
//!
//! ```ignore
//! let tx = conn.transaction()?;
//! // ... business writes ...
//! queries::insert_record(&tx, "outbox", &NewOutboxRecord { .. })?;
//! tx.commit()?;
//! ```

mod binding;
pub mod codec;
mod eligibility;
mod error;
mod models;
pub mod queries;
mod sqlite;

pub use binding::OutboxStore;
pub use eligibility::ClaimEligibility;
pub use error::{CodecError, StoreError, StoreResult};
pub use models::{
    Header, LeaderId, MutationOutcome, NewOutboxRecord, OutboxId, OutboxRecord,
};
pub use sqlite::{SqliteBinding, SqliteBindingConfig, DEFAULT_TABLE};
