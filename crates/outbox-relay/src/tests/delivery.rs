//! Delivery behaviour of a single healthy cycle.

use super::harness::{fast_config, leader, PublishResponse, TestHarness};
use crate::{CycleReport, RelayConfig};
use outbox_store::{queries, Header, NewOutboxRecord, OutboxId};
use std::time::Duration;

#[tokio::test]
async fn test_cycle_publishes_in_id_order_and_removes() {
    let harness = TestHarness::new();
    let ids: Vec<OutboxId> = ["a", "b", "c"]
        .iter()
        .map(|key| harness.insert(key, b"{}"))
        .collect();
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            claimed: 3,
            published: 3,
            removed: 3,
            ..Default::default()
        }
    );
    assert_eq!(harness.publisher.published_ids(), ids);
    assert!(harness.remaining_ids().is_empty());
}

#[tokio::test]
async fn test_published_records_carry_leader_stamp() {
    let harness = TestHarness::new();
    harness.insert("a", b"1");
    let relay = harness.relay(fast_config());

    relay.run_cycle(&leader("leader-a")).await.unwrap();

    let published = harness.publisher.published();
    assert_eq!(published[0].claimant, Some(leader("leader-a")));
}

#[tokio::test]
async fn test_empty_outbox_is_not_an_error() {
    let harness = TestHarness::new();
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report, CycleReport::default());
    assert_eq!(harness.publisher.attempts(), 0);
}

#[tokio::test]
async fn test_publish_failure_releases_record() {
    let harness = TestHarness::new();
    let first = harness.insert("a", b"1");
    let second = harness.insert("b", b"2");
    let third = harness.insert("c", b"3");
    harness.publisher.queue_response(PublishResponse::Accept);
    harness.publisher.queue_response(PublishResponse::Reject);
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report.published, 2);
    assert_eq!(report.removed, 2);
    assert_eq!(report.released, 1);
    assert_eq!(harness.publisher.published_ids(), vec![first, third]);
    assert_eq!(harness.remaining_ids(), vec![second]);
    assert_eq!(harness.claimant_of(second), None);

    // Released row is picked up again by the next cycle
    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();
    assert_eq!(report.published, 1);
    assert!(harness.remaining_ids().is_empty());
}

#[tokio::test]
async fn test_failed_key_holds_back_later_records() {
    let harness = TestHarness::new();
    let a1 = harness.insert("customer-1", b"created");
    let a2 = harness.insert("customer-1", b"updated");
    let b1 = harness.insert("customer-2", b"created");
    harness.publisher.queue_response(PublishResponse::Reject);
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    // customer-1/updated is never offered while customer-1/created is pending
    assert_eq!(harness.publisher.attempts(), 2);
    assert_eq!(harness.publisher.published_ids(), vec![b1]);
    assert_eq!(report.released, 2);
    assert_eq!(harness.remaining_ids(), vec![a1, a2]);

    relay.run_cycle(&leader("leader-a")).await.unwrap();
    assert_eq!(harness.publisher.published_ids(), vec![b1, a1, a2]);
}

#[tokio::test]
async fn test_key_hold_can_be_disabled() {
    let harness = TestHarness::new();
    let a1 = harness.insert("customer-1", b"created");
    let a2 = harness.insert("customer-1", b"updated");
    harness.publisher.queue_response(PublishResponse::Reject);
    let relay = harness.relay(RelayConfig {
        hold_key_order: false,
        ..fast_config()
    });

    relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(harness.publisher.attempts(), 2);
    assert_eq!(harness.publisher.published_ids(), vec![a2]);
    assert_eq!(harness.remaining_ids(), vec![a1]);
}

#[tokio::test]
async fn test_batch_size_bounds_each_cycle() {
    let harness = TestHarness::new();
    for key in ["a", "b", "c"] {
        harness.insert(key, b"x");
    }
    let relay = harness.relay(RelayConfig {
        batch_size: 2,
        ..fast_config()
    });

    let first = relay.run_cycle(&leader("leader-a")).await.unwrap();
    let second = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(first.claimed, 2);
    assert_eq!(second.claimed, 1);
    assert!(harness.remaining_ids().is_empty());
}

#[tokio::test]
async fn test_publish_timeout_releases_record() {
    let harness = TestHarness::new();
    let id = harness.insert("a", b"1");
    harness.publisher.queue_response(PublishResponse::Hang);
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report.published, 0);
    assert_eq!(report.released, 1);
    assert_eq!(harness.remaining_ids(), vec![id]);
    assert_eq!(harness.claimant_of(id), None);
}

#[tokio::test]
async fn test_tombstone_and_header_order_reach_publisher() {
    let harness = TestHarness::new();
    {
        let binding = harness.store.binding();
        let conn = binding.connection().unwrap();
        queries::insert_record(
            &conn,
            binding.table(),
            &NewOutboxRecord {
                topic: "orders".to_string(),
                key: "order-9".to_string(),
                payload: None,
                headers: vec![Header::new("z-last", "1"), Header::new("a-first", "2")],
            },
        )
        .unwrap();
    }
    let relay = harness.relay(fast_config());

    relay.run_cycle(&leader("leader-a")).await.unwrap();

    let published = harness.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload, None);
    let keys: Vec<&str> = published[0].headers.iter().map(|h| h.key.as_str()).collect();
    assert_eq!(keys, vec!["z-last", "a-first"]);
}

#[tokio::test]
async fn test_stats_track_cycles() {
    let harness = TestHarness::new();
    harness.insert("a", b"1");
    harness.insert("b", b"2");
    harness.publisher.queue_response(PublishResponse::Reject);
    let relay = harness.relay(fast_config());

    relay.run_cycle(&leader("leader-a")).await.unwrap();
    relay.run_cycle(&leader("leader-a")).await.unwrap();

    let stats = relay.stats().snapshot();
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.claimed, 3);
    assert_eq!(stats.published, 2);
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_slow_publisher_within_deadline() {
    let harness = TestHarness::new();
    harness.insert("a", b"1");
    harness.insert("b", b"2");
    harness
        .publisher
        .set_default_response(PublishResponse::DelayThenAccept(Duration::from_millis(50)));
    let relay = harness.relay(fast_config());

    let report = relay.run_cycle(&leader("leader-a")).await.unwrap();

    assert_eq!(report.published, 2);
    assert!(harness.remaining_ids().is_empty());
}
