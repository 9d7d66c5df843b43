//! Leader identity sources.
//!
//! Election happens elsewhere. The relay only asks, before every claim and
//! before every delivery, which token (if any) it currently holds.

use outbox_store::LeaderId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Supplies the currently valid leader token.
pub trait LeaderSource: Send + Sync {
    /// The token this process holds right now, or `None` when not leader.
    fn current_leader(&self) -> Option<LeaderId>;
}

/// Always leader with a fixed token.
#[derive(Debug, Clone)]
pub struct StaticLeader(LeaderId);

impl StaticLeader {
    pub fn new(leader: LeaderId) -> Self {
        Self(leader)
    }
}

impl LeaderSource for StaticLeader {
    fn current_leader(&self) -> Option<LeaderId> {
        Some(self.0.clone())
    }
}

/// Leadership driven by an external election client.
///
/// Cloned handles share state: the election side calls [`set`](Self::set)
/// and [`revoke`](Self::revoke), the relay reads.
#[derive(Debug, Clone, Default)]
pub struct SharedLeader {
    inner: Arc<RwLock<Option<LeaderId>>>,
}

impl SharedLeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new token, replacing any previous one.
    pub fn set(&self, leader: LeaderId) {
        *self.inner.write() = Some(leader);
    }

    /// Drop leadership.
    pub fn revoke(&self) {
        *self.inner.write() = None;
    }
}

impl LeaderSource for SharedLeader {
    fn current_leader(&self) -> Option<LeaderId> {
        self.inner.read().clone()
    }
}
