//! Backend-agnostic outbox binding contract.

use crate::{LeaderId, MutationOutcome, OutboxId, OutboxRecord, StoreResult};

/// Storage-facing contract for the claim protocol.
///
/// Every data operation is blocking and atomic at the storage layer.
/// Storage errors are returned verbatim; retry policy belongs to the caller.
pub trait OutboxStore: Send + Sync {
    /// Stamp up to `limit` eligible records with `leader`.
    ///
    /// Returns them sorted ascending by id. An empty result is not an
    /// error. On error nothing is returned and no stamp persists.
    fn claim(&self, leader: &LeaderId, limit: usize) -> StoreResult<Vec<OutboxRecord>>;

    /// Permanently delete a record after confirmed delivery.
    fn remove(&self, id: OutboxId) -> StoreResult<MutationOutcome>;

    /// Return a claimed record to the unclaimed pool after failed delivery.
    fn release(&self, id: OutboxId) -> StoreResult<MutationOutcome>;

    /// Release all held resources. Idempotent.
    ///
    /// Must not be called while another operation is in flight.
    fn dispose(&self);
}
