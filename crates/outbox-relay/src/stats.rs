//! Relay counters.

use crate::relay::CycleReport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative relay counters, shared between the loop and observers.
#[derive(Debug, Default)]
pub struct RelayStats {
    cycles: AtomicU64,
    claimed: AtomicU64,
    published: AtomicU64,
    removed: AtomicU64,
    released: AtomicU64,
    race_lost: AtomicU64,
    fenced: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub claimed: u64,
    pub published: u64,
    pub removed: u64,
    pub released: u64,
    pub race_lost: u64,
    pub fenced: u64,
    pub errors: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.record_settlements(report);
    }

    /// Counts work done by a cycle that later aborted.
    pub(crate) fn record_error(&self, partial: &CycleReport) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.record_settlements(partial);
    }

    /// Counts work done outside a regular cycle.
    pub(crate) fn record_settlements(&self, report: &CycleReport) {
        self.claimed.fetch_add(report.claimed as u64, Ordering::Relaxed);
        self.published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.removed.fetch_add(report.removed as u64, Ordering::Relaxed);
        self.released
            .fetch_add(report.released as u64, Ordering::Relaxed);
        self.race_lost
            .fetch_add(report.race_lost as u64, Ordering::Relaxed);
        self.fenced.fetch_add(report.fenced as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            race_lost: self.race_lost.load(Ordering::Relaxed),
            fenced: self.fenced.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
