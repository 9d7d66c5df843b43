//! Which claimed rows a new claim may take over.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rule deciding when a row is visible to `claim`.
///
/// Unclaimed rows are always eligible. The variants differ in how a row
/// stamped by another leader is judged to have lapsed. There is no
/// built-in default: the right choice depends on how quickly the election
/// collaborator detects a dead leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ClaimEligibility {
    /// Never take over a claimed row.
    UnclaimedOnly,
    /// Take over rows whose claim is at least `after_ms` old, including
    /// rows stamped with the claiming leader's own token. A relay restarted
    /// with a fixed token recovers its crashed batch this way; `after_ms`
    /// must exceed the longest cycle.
    ExpireAfter { after_ms: u64 },
    /// Take over any row stamped by a different leader token.
    ForeignLeaders,
}

impl ClaimEligibility {
    pub fn expire_after(after: Duration) -> Self {
        Self::ExpireAfter {
            after_ms: after.as_millis().min(i64::MAX as u128) as u64,
        }
    }

    /// SQL predicate selecting eligible rows.
    ///
    /// `?1` binds the claiming leader, `?4` the staleness cutoff (ms).
    /// Only `ForeignLeaders` filters on the claimant token.
    pub(crate) fn predicate(&self) -> &'static str {
        match self {
            Self::UnclaimedOnly => "claimant_id IS NULL",
            Self::ExpireAfter { .. } => "claimant_id IS NULL OR claimed_at <= ?4",
            Self::ForeignLeaders => "claimant_id IS NULL OR claimant_id <> ?1",
        }
    }

    /// Claims at or before this instant (unix ms) have lapsed.
    pub(crate) fn cutoff_ms(&self, now_ms: i64) -> Option<i64> {
        match self {
            Self::ExpireAfter { after_ms } => {
                Some(now_ms.saturating_sub(i64::try_from(*after_ms).unwrap_or(i64::MAX)))
            }
            _ => None,
        }
    }
}
