//! Leadership changes: fencing, takeover and idling.

use super::harness::{fast_config, leader, Op, PublishResponse, TestHarness};
use outbox_store::{ClaimEligibility, OutboxStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_lost_leadership_fences_rest_of_batch() {
    let harness = TestHarness::new();
    let first = harness.insert("a", b"1");
    let second = harness.insert("b", b"2");
    let third = harness.insert("c", b"3");
    harness
        .publisher
        .queue_response(PublishResponse::AcceptThenRevoke);
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report.published, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.fenced, 2);
    assert_eq!(report.released, 2);
    assert_eq!(harness.publisher.attempts(), 1);
    assert_eq!(harness.publisher.published_ids(), vec![first]);
    assert_eq!(harness.remaining_ids(), vec![second, third]);
    assert_eq!(harness.claimant_of(second), None);
}

#[tokio::test]
async fn test_rotated_token_fences_old_term() {
    let harness = TestHarness::new();
    harness.insert("a", b"1");
    harness.election.set(leader("leader-b"));
    let relay = harness.relay(fast_config());

    // A cycle started with a stale token publishes nothing
    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report.claimed, 1);
    assert_eq!(report.fenced, 1);
    assert_eq!(harness.publisher.attempts(), 0);
}

#[tokio::test]
async fn test_new_leader_takes_over_released_records() {
    let harness = TestHarness::new();
    harness.insert("a", b"1");
    let second = harness.insert("b", b"2");
    harness
        .publisher
        .queue_response(PublishResponse::AcceptThenRevoke);
    let relay = harness.relay(fast_config());

    relay.run_cycle(&leader("leader-a")).await.unwrap();
    harness.election.set(leader("leader-b"));
    let report = relay.run_cycle(&leader("leader-b")).await.unwrap();

    assert_eq!(report.claimed, 1);
    assert_eq!(report.published, 1);
    assert_eq!(harness.publisher.published()[1].id, second);
    assert_eq!(
        harness.publisher.published()[1].claimant,
        Some(leader("leader-b"))
    );
    assert!(harness.remaining_ids().is_empty());
}

#[tokio::test]
async fn test_crashed_leader_rows_taken_over_by_foreign_leader() {
    let harness = TestHarness::with_eligibility(ClaimEligibility::ForeignLeaders);
    let id = harness.insert("a", b"1");
    // leader-a claims and dies without settling
    assert_eq!(
        harness.store.binding().claim(&leader("leader-a"), 10).unwrap().len(),
        1
    );
    harness.election.set(leader("leader-b"));
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-b")).await.unwrap();

    assert_eq!(report.published, 1);
    assert_eq!(harness.publisher.published_ids(), vec![id]);
}

#[tokio::test]
async fn test_leader_never_reclaims_its_own_rows() {
    let harness = TestHarness::with_eligibility(ClaimEligibility::ForeignLeaders);
    harness.insert("a", b"1");
    harness
        .store
        .binding()
        .claim(&leader("leader-a"), 10)
        .unwrap();
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report.claimed, 0);
}

#[tokio::test]
async fn test_unclaimed_only_never_takes_over() {
    let harness = TestHarness::with_eligibility(ClaimEligibility::UnclaimedOnly);
    let id = harness.insert("a", b"1");
    harness
        .store
        .binding()
        .claim(&leader("leader-a"), 10)
        .unwrap();
    harness.election.set(leader("leader-b"));
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-b")).await.unwrap();

    assert_eq!(report.claimed, 0);
    assert_eq!(harness.claimant_of(id).as_deref(), Some("leader-a"));
}

#[tokio::test]
async fn test_expired_claim_taken_over_after_lapse() {
    let harness = TestHarness::with_eligibility(ClaimEligibility::ExpireAfter { after_ms: 100 });
    let id = harness.insert("a", b"1");
    harness
        .store
        .binding()
        .claim(&leader("leader-a"), 10)
        .unwrap();
    harness.election.set(leader("leader-b"));
    let relay = harness.relay(fast_config());

    let early = relay.run_cycle(&leader("leader-b")).await.unwrap();
    assert_eq!(early.claimed, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let late = relay.run_cycle(&leader("leader-b")).await.unwrap();

    assert_eq!(late.claimed, 1);
    assert_eq!(harness.publisher.published_ids(), vec![id]);
}

#[tokio::test]
async fn test_restart_with_same_token_recovers_expired_batch() {
    let harness = TestHarness::with_eligibility(ClaimEligibility::ExpireAfter { after_ms: 100 });
    let id = harness.insert("a", b"1");
    // leader-a claims and crashes; it comes back with the same token
    harness
        .store
        .binding()
        .claim(&leader("leader-a"), 10)
        .unwrap();
    let relay = harness.relay(fast_config());

    let early = relay.run_cycle(&leader("leader-a")).await.unwrap();
    assert_eq!(early.claimed, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let late = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(late.claimed, 1);
    assert_eq!(harness.publisher.published_ids(), vec![id]);
    assert!(harness.remaining_ids().is_empty());
}

#[tokio::test]
async fn test_follower_idles_without_claiming() {
    let harness = TestHarness::new();
    harness.insert("a", b"1");
    harness.election.revoke();
    let relay = Arc::new(harness.relay(fast_config()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.run(shutdown_rx).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.store.calls(Op::Claim), 0);
    assert_eq!(harness.publisher.attempts(), 0);

    // Winning the election starts delivery without a restart
    harness.election.set(leader("leader-a"));
    tokio::time::timeout(Duration::from_secs(5), async {
        while !harness.remaining_ids().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_relay() {
    let harness = TestHarness::new();
    let relay = harness.relay(fast_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    drop(shutdown_tx);

    tokio::time::timeout(Duration::from_secs(5), relay.run(shutdown_rx))
        .await
        .unwrap();
}
