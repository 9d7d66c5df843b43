//! # Outbox Relay
//!
//! Drains a transactional outbox into a downstream publisher while this
//! process holds leadership.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ current_leader ┌─────────┐ publish ┌───────────┐
//! │ LeaderSource │ ◀───────────── │  Relay  │ ──────▶ │ Publisher │
//! └──────────────┘                └────┬────┘         └───────────┘
//!                                      │ claim / remove / release
//!                                      ▼
//!                                ┌─────────────┐
//!                                │ OutboxStore │
//!                                └─────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Records are published in ascending id order within a cycle.
//! - A record is removed only after the publisher confirmed it.
//! - Every other claimed record is released, immediately or on a later
//!   cycle when the store was unavailable.
//! - Delivery is at-least-once: consumers must tolerate duplicates.

mod backoff;
pub mod config;
mod error;
pub mod http_publisher;
pub mod leader;
pub mod publisher;
mod relay;
mod stats;

#[cfg(test)]
mod tests;

pub use backoff::Backoff;
pub use config::{RelayConfig, Settings};
pub use error::{RelayError, RelayResult};
pub use http_publisher::{HttpPublisher, HttpPublisherConfig};
pub use leader::{LeaderSource, SharedLeader, StaticLeader};
pub use publisher::{LogPublisher, PublishError, Publisher};
pub use relay::{CycleReport, Relay, Settlement};
pub use stats::{RelayStats, StatsSnapshot};
