//! Outbox model types.

use crate::CodecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary ordering key of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(pub i64);

impl fmt::Display for OutboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OutboxId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identity of the leader currently holding a claim.
///
/// Supplied by the election collaborator and only ever compared for
/// equality. It is never ordered or interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeaderId(String);

impl LeaderId {
    /// Wrap an externally issued token. Empty tokens are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self, CodecError> {
        let token = token.into();
        if token.is_empty() {
            return Err(CodecError::EmptyLeaderId);
        }
        Ok(Self(token))
    }

    /// Mint a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LeaderId {
    type Error = CodecError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Self::new(token)
    }
}

impl From<LeaderId> for String {
    fn from(id: LeaderId) -> Self {
        id.0
    }
}

impl fmt::Display for LeaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single message header. Order within a record is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A claimed outbox row, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub id: OutboxId,
    pub create_time: DateTime<Utc>,
    pub topic: String,
    pub key: String,
    /// `None` is a tombstone and is forwarded as such.
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<Header>,
    pub claimant: Option<LeaderId>,
}

/// New outbox row written by the upstream producer.
#[derive(Debug, Clone, Default)]
pub struct NewOutboxRecord {
    pub topic: String,
    pub key: String,
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<Header>,
}

/// Outcome of an idempotent mutation.
///
/// `NoOp` means no row was affected: the row was already handled by an
/// earlier attempt or has moved on to another leader. It is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    NoOp,
}

impl MutationOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Exactly one affected row means the mutation applied.
    pub fn from_affected(affected: usize) -> Self {
        if affected == 1 {
            Self::Applied
        } else {
            Self::NoOp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader_id_rejects_empty() {
        assert_eq!(LeaderId::new(""), Err(CodecError::EmptyLeaderId));
        assert_eq!(LeaderId::new("leader-a").unwrap().as_str(), "leader-a");
    }

    #[test]
    fn test_leader_id_generate_is_unique() {
        assert_ne!(LeaderId::generate(), LeaderId::generate());
    }

    #[test]
    fn test_leader_id_serde_rejects_empty() {
        let parsed: Result<LeaderId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());

        let parsed: LeaderId = serde_json::from_str("\"node-1\"").unwrap();
        assert_eq!(parsed.to_string(), "node-1");
    }

    #[test]
    fn test_mutation_outcome_from_affected() {
        assert_eq!(MutationOutcome::from_affected(1), MutationOutcome::Applied);
        assert_eq!(MutationOutcome::from_affected(0), MutationOutcome::NoOp);
        assert_eq!(MutationOutcome::from_affected(2), MutationOutcome::NoOp);
        assert!(MutationOutcome::Applied.is_applied());
        assert!(!MutationOutcome::NoOp.is_applied());
    }
}
