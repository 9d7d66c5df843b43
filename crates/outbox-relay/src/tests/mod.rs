//! Integration tests for the outbox relay.
//!
//! - `harness.rs`      - Scripted publisher, fault-injecting store, test harness
//! - `delivery.rs`     - Ordering, removal on success, release on failure, key hold
//! - `failures.rs`     - Store failures, carry-over settlement, timeouts, backoff
//! - `leader_churn.rs` - Fencing, takeover by a new leader, idling, shutdown

mod delivery;
mod leader_churn;
