//! The relay loop driving the claim protocol.
//!
//! Each cycle claims a batch for the current leader, hands every record to
//! the publisher in id order, and settles it: remove on confirmed delivery,
//! release otherwise. Delivery is at-least-once; the store's idempotent
//! mutations make every settlement safe to retry.

use crate::backoff::Backoff;
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::leader::LeaderSource;
use crate::publisher::Publisher;
use crate::stats::RelayStats;
use outbox_store::{
    LeaderId, MutationOutcome, OutboxId, OutboxRecord, OutboxStore, StoreResult,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a claimed record leaves this leader's hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Remove,
    Release,
}

/// A settlement whose store call failed and must be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingSettlement {
    id: OutboxId,
    action: Settlement,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records returned by claim.
    pub claimed: usize,
    /// Records the publisher accepted.
    pub published: usize,
    /// Removals that applied.
    pub removed: usize,
    /// Releases that applied.
    pub released: usize,
    /// Removals or releases that affected no row.
    pub race_lost: usize,
    /// Records released unpublished because leadership moved on.
    pub fenced: usize,
}

/// Counts blocking store calls still running, including abandoned ones.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

type ClaimTask = JoinHandle<StoreResult<Vec<OutboxRecord>>>;

/// Leader-driven outbox relay.
pub struct Relay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn Publisher>,
    leader: Arc<dyn LeaderSource>,
    config: RelayConfig,
    stats: Arc<RelayStats>,
    carry_over: Mutex<VecDeque<PendingSettlement>>,
    /// Claims that outlived their deadline; their records get released
    /// once the call completes.
    late_claims: Mutex<Vec<ClaimTask>>,
    in_flight: Arc<InFlight>,
}

impl Relay {
    /// Create a new relay. Fails on invalid configuration.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn Publisher>,
        leader: Arc<dyn LeaderSource>,
        config: RelayConfig,
    ) -> RelayResult<Self> {
        config.validate()?;

        Ok(Self {
            store,
            publisher,
            leader,
            config,
            stats: Arc::new(RelayStats::new()),
            carry_over: Mutex::new(VecDeque::new()),
            late_claims: Mutex::new(Vec::new()),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Settlements waiting for a retry.
    pub fn pending_settlements(&self) -> usize {
        self.carry_over.lock().len()
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// On exit, waits for abandoned store calls and settles what it can,
    /// so the store may be disposed afterwards.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval_ms,
            hold_key_order = self.config.hold_key_order,
            "Relay started"
        );

        let mut backoff = Backoff::new(
            self.config.io_backoff_initial_ms,
            self.config.io_backoff_max_ms,
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.leader.current_leader() {
                None => {
                    debug!("Not leader, idling");
                    self.config.poll_interval()
                }
                Some(leader) => match self.run_cycle(&leader).await {
                    Ok(report) => {
                        backoff.reset();
                        if report.claimed >= self.config.batch_size {
                            Duration::ZERO
                        } else {
                            self.config.poll_interval()
                        }
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        error!(
                            leader = %leader,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            pending = self.pending_settlements(),
                            "Relay cycle aborted, backing off"
                        );
                        delay
                    }
                },
            };

            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Relay stopping");
        self.drain().await;
        info!(stats = ?self.stats.snapshot(), "Relay stopped");
    }

    /// Run one claim/publish/settle cycle as `leader`.
    pub async fn run_cycle(&self, leader: &LeaderId) -> RelayResult<CycleReport> {
        let mut report = CycleReport::default();

        match self.drive_cycle(leader, &mut report).await {
            Ok(()) => {
                self.stats.record_cycle(&report);
                if report.claimed > 0 {
                    info!(
                        leader = %leader,
                        claimed = report.claimed,
                        published = report.published,
                        removed = report.removed,
                        released = report.released,
                        race_lost = report.race_lost,
                        fenced = report.fenced,
                        "Relay cycle complete"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                self.stats.record_error(&report);
                Err(e)
            }
        }
    }

    async fn drive_cycle(&self, leader: &LeaderId, report: &mut CycleReport) -> RelayResult<()> {
        self.collect_late_claims(self.config.store_timeout()).await?;
        self.settle_carry_over(report).await?;

        let records = self.claim(leader).await?;
        report.claimed = records.len();
        if records.is_empty() {
            debug!(leader = %leader, "Nothing to relay");
            return Ok(());
        }

        let mut failed_keys = HashSet::new();
        let mut remaining = records.into_iter();

        while let Some(record) = remaining.next() {
            let action = self
                .deliver(leader, &record, &mut failed_keys, report)
                .await;

            if let Err(e) = self.settle(record.id, action, report).await {
                warn!(
                    id = %record.id,
                    action = ?action,
                    error = %e,
                    "Settlement failed, deferring to next cycle"
                );
                self.defer(record.id, action, remaining.map(|r| r.id));
                return Err(e);
            }
        }

        Ok(())
    }

    /// Decide what happens to one claimed record, publishing it if allowed.
    async fn deliver(
        &self,
        leader: &LeaderId,
        record: &OutboxRecord,
        failed_keys: &mut HashSet<String>,
        report: &mut CycleReport,
    ) -> Settlement {
        if self.leader.current_leader().as_ref() != Some(leader) {
            report.fenced += 1;
            debug!(id = %record.id, leader = %leader, "Leadership lost, releasing unpublished");
            return Settlement::Release;
        }

        if self.config.hold_key_order && failed_keys.contains(&record.key) {
            debug!(
                id = %record.id,
                key = %record.key,
                "Earlier record with this key failed, holding back"
            );
            return Settlement::Release;
        }

        let published =
            tokio::time::timeout(self.config.publish_timeout(), self.publisher.publish(record))
                .await;

        let failure = match published {
            Ok(Ok(())) => {
                report.published += 1;
                debug!(id = %record.id, topic = %record.topic, "Published");
                return Settlement::Remove;
            }
            Ok(Err(e)) => RelayError::Publish(e),
            Err(_) => RelayError::Timeout {
                operation: "publish",
                after_ms: self.config.publish_timeout_ms,
            },
        };

        warn!(
            id = %record.id,
            topic = %record.topic,
            error = %failure,
            "Publish failed, releasing record"
        );
        failed_keys.insert(record.key.clone());
        Settlement::Release
    }

    async fn settle(
        &self,
        id: OutboxId,
        action: Settlement,
        report: &mut CycleReport,
    ) -> RelayResult<()> {
        let outcome = match action {
            Settlement::Remove => self.store_call("remove", move |store| store.remove(id)).await?,
            Settlement::Release => {
                self.store_call("release", move |store| store.release(id)).await?
            }
        };

        match (action, outcome) {
            (_, MutationOutcome::NoOp) => {
                report.race_lost += 1;
                debug!(id = %id, action = ?action, "Row already handled elsewhere");
            }
            (Settlement::Remove, MutationOutcome::Applied) => report.removed += 1,
            (Settlement::Release, MutationOutcome::Applied) => report.released += 1,
        }
        Ok(())
    }

    fn defer(&self, id: OutboxId, action: Settlement, rest: impl Iterator<Item = OutboxId>) {
        let mut queue = self.carry_over.lock();
        queue.push_back(PendingSettlement { id, action });
        queue.extend(rest.map(|id| PendingSettlement {
            id,
            action: Settlement::Release,
        }));
    }

    async fn settle_carry_over(&self, report: &mut CycleReport) -> RelayResult<()> {
        loop {
            let next = self.carry_over.lock().pop_front();
            let Some(pending) = next else {
                return Ok(());
            };

            if let Err(e) = self.settle(pending.id, pending.action, report).await {
                self.carry_over.lock().push_front(pending);
                return Err(e);
            }
        }
    }

    async fn claim(&self, leader: &LeaderId) -> RelayResult<Vec<OutboxRecord>> {
        let claimant = leader.clone();
        let limit = self.config.batch_size;

        let mut task = self.spawn_store(move |store| store.claim(&claimant, limit));
        let result = self.await_store("claim", &mut task).await;
        if let Err(RelayError::Timeout { .. }) = result {
            self.late_claims.lock().push(task);
        }
        result
    }

    /// Queue releases for records returned by claims that timed out.
    ///
    /// Waits up to `wait` for such claims to complete. Fails with a timeout
    /// if one is still running, since claims from one leader never overlap.
    async fn collect_late_claims(&self, wait: Duration) -> RelayResult<()> {
        let mut tasks = std::mem::take(&mut *self.late_claims.lock());
        if tasks.is_empty() {
            return Ok(());
        }

        debug!(count = tasks.len(), "Waiting for timed-out claims");
        let deadline = tokio::time::Instant::now() + wait;

        while let Some(mut task) = tasks.pop() {
            let joined = match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tasks.push(task);
                    self.late_claims.lock().extend(tasks);
                    return Err(RelayError::Timeout {
                        operation: "claim",
                        after_ms: self.config.store_timeout_ms,
                    });
                }
            };

            match joined {
                Ok(Ok(records)) if !records.is_empty() => {
                    warn!(
                        count = records.len(),
                        "Releasing records from a claim that timed out"
                    );
                    self.carry_over
                        .lock()
                        .extend(records.iter().map(|r| PendingSettlement {
                            id: r.id,
                            action: Settlement::Release,
                        }));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!(error = %e, "Timed-out claim failed without effect"),
                Err(e) => warn!(error = %e, "Timed-out claim task failed"),
            }
        }
        Ok(())
    }

    /// Wait for abandoned store calls, then try once to settle leftovers.
    async fn drain(&self) {
        if tokio::time::timeout(self.config.store_timeout(), self.in_flight.wait_idle())
            .await
            .is_err()
        {
            warn!("Store calls still running at shutdown");
            return;
        }

        // Every store call has returned, so no late claim is left running
        if let Err(e) = self.collect_late_claims(Duration::ZERO).await {
            warn!(error = %e, "Timed-out claim still running at shutdown");
        }

        let mut report = CycleReport::default();
        if let Err(e) = self.settle_carry_over(&mut report).await {
            warn!(
                error = %e,
                pending = self.pending_settlements(),
                "Unsettled records left claimed at shutdown"
            );
        }
        self.stats.record_settlements(&report);
    }

    fn spawn_store<T, F>(&self, f: F) -> JoinHandle<StoreResult<T>>
    where
        F: FnOnce(&dyn OutboxStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let guard = self.in_flight.enter();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            f(store.as_ref())
        })
    }

    async fn await_store<T>(
        &self,
        operation: &'static str,
        task: &mut JoinHandle<StoreResult<T>>,
    ) -> RelayResult<T> {
        match tokio::time::timeout(self.config.store_timeout(), task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => Err(RelayError::Timeout {
                operation,
                after_ms: self.config.store_timeout_ms,
            }),
        }
    }

    async fn store_call<T, F>(&self, operation: &'static str, f: F) -> RelayResult<T>
    where
        F: FnOnce(&dyn OutboxStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = self.spawn_store(f);
        self.await_store(operation, &mut task).await
    }
}
