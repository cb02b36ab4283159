//! End-to-end admission scenarios against the public API.
//!
//! Run with `RUST_LOG=qc_18_inbound_throttling=trace` to see every grant.

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use qc_18_inbound_throttling::{
    InboundAdmissionController, InboundMsgThrottler, PeerId, ThrottlerConfig, ValidatorWeights,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const BLOCKED: Duration = Duration::from_millis(50);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn peer(byte: u8) -> PeerId {
    PeerId::new([byte; 32])
}

fn small_node() -> ThrottlerConfig {
    ThrottlerConfig {
        weighted_pool_capacity: 1_000,
        at_large_pool_capacity: 500,
        per_peer_at_large_cap: 200,
        max_concurrent_per_peer: 5,
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// TEST GROUP 1: Validator And Non-Validator Traffic
// =============================================================================

#[tokio::test]
async fn test_validator_and_capped_peer_walkthrough() {
    init_tracing();
    let validator = peer(0xAA);
    let outsider = peer(0x01);
    let weights = Arc::new(ValidatorWeights::from_weights([(validator, 100)]));
    let throttler = Arc::new(
        InboundAdmissionController::new("walkthrough", &Registry::new(), weights, small_node())
            .unwrap(),
    );

    // Sole validator: entitled to the whole weighted pool
    timeout(BLOCKED, throttler.acquire(1_000, validator)).await.unwrap();
    assert_eq!(throttler.held_by(&validator), (1_000, 0));
    assert_eq!(throttler.stats().weighted_remaining, 0);

    timeout(BLOCKED, throttler.acquire(200, outsider)).await.unwrap();
    assert_eq!(throttler.stats().at_large_remaining, 300);

    // Outsider is at its at-large cap even though the pool has room
    let second = {
        let throttler = throttler.clone();
        tokio::spawn(async move { throttler.acquire(200, outsider).await })
    };
    settle().await;
    assert!(!second.is_finished());
    assert_eq!(throttler.queued_for(&outsider), 1);

    // Validator bytes coming back do not lift the outsider's cap
    throttler.release(1_000, validator);
    settle().await;
    assert!(!second.is_finished());
    assert_eq!(throttler.stats().weighted_remaining, 1_000);

    throttler.release(200, outsider);
    timeout(BLOCKED, second).await.unwrap().unwrap();

    let stats = throttler.stats();
    assert_eq!(stats.at_large_remaining, 300);
    assert_eq!(stats.byte_waiters, 0);
    assert_eq!(throttler.held_by(&outsider), (0, 200));
    assert_eq!(throttler.in_flight(&outsider), 1);
}

#[tokio::test]
async fn test_validator_floor_survives_sybil_flood() {
    init_tracing();
    let validator = peer(0xAA);
    let weights = Arc::new(ValidatorWeights::from_weights([(validator, 1), (peer(0xBB), 1)]));
    let throttler =
        InboundAdmissionController::new("sybil", &Registry::new(), weights, small_node()).unwrap();

    // Many identities drain the at-large pool between them
    for (id, size) in [(1u8, 200), (2, 200), (3, 100)] {
        throttler.acquire(size, peer(id)).await;
    }
    assert_eq!(throttler.stats().at_large_remaining, 0);
    assert!(timeout(BLOCKED, throttler.acquire(1, peer(4))).await.is_err());

    // Half the weight, half the weighted pool
    timeout(BLOCKED, throttler.acquire(500, validator)).await.unwrap();
    assert_eq!(throttler.held_by(&validator), (500, 0));

    // Past its share with the at-large pool empty
    assert!(timeout(BLOCKED, throttler.acquire(1, validator)).await.is_err());
    assert_eq!(throttler.stats().byte_waiters, 0);
}

#[tokio::test]
async fn test_weight_changes_apply_to_next_request() {
    init_tracing();
    let validator = peer(0xAA);
    let weights = Arc::new(ValidatorWeights::new());
    let throttler = InboundAdmissionController::new(
        "rotation",
        &Registry::new(),
        weights.clone(),
        small_node(),
    )
    .unwrap();

    throttler.acquire(150, validator).await;
    assert_eq!(throttler.held_by(&validator), (0, 150));

    weights.set_weight(validator, 10);
    throttler.acquire(150, validator).await;
    assert_eq!(throttler.held_by(&validator), (150, 150));

    // Each release goes back to the pool that granted it
    throttler.release(150, validator);
    throttler.release(150, validator);
    let stats = throttler.stats();
    assert_eq!(stats.weighted_remaining, 1_000);
    assert_eq!(stats.at_large_remaining, 500);
}

// =============================================================================
// TEST GROUP 2: Concurrency Limits
// =============================================================================

#[tokio::test]
async fn test_tiny_message_flood_is_bounded() {
    init_tracing();
    let config = ThrottlerConfig {
        max_concurrent_per_peer: 2,
        ..small_node()
    };
    let throttler = Arc::new(
        InboundAdmissionController::new(
            "flood",
            &Registry::new(),
            Arc::new(ValidatorWeights::new()),
            config,
        )
        .unwrap(),
    );
    let flooder = peer(0x07);

    throttler.acquire(1, flooder).await;
    throttler.acquire(1, flooder).await;
    let third = {
        let throttler = throttler.clone();
        tokio::spawn(async move { throttler.acquire(1, flooder).await })
    };
    settle().await;
    assert!(!third.is_finished());

    // Other peers are unaffected
    timeout(BLOCKED, throttler.acquire(1, peer(0x08))).await.unwrap();

    throttler.release(1, flooder);
    timeout(BLOCKED, third).await.unwrap().unwrap();
    assert_eq!(throttler.in_flight(&flooder), 2);
    assert_eq!(throttler.stats().msgs_in_flight, 3);
}

#[tokio::test]
async fn test_permits_release_in_any_order() {
    init_tracing();
    let throttler = InboundAdmissionController::new(
        "permits",
        &Registry::new(),
        Arc::new(ValidatorWeights::new()),
        small_node(),
    )
    .unwrap();
    let sender = peer(0x09);
    let before = throttler.stats();

    let first = throttler.admit(50, sender).await;
    let second = throttler.admit(70, sender).await;
    assert_eq!(throttler.held_by(&sender), (0, 120));

    drop(first);
    assert_eq!(throttler.held_by(&sender), (0, 70));
    drop(second);
    assert_eq!(throttler.stats(), before);
}

// =============================================================================
// TEST GROUP 3: Concurrent Load
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_load_drains_to_initial_state() {
    init_tracing();
    let validators: Vec<PeerId> = (0xA0..0xA4).map(peer).collect();
    let outsiders: Vec<PeerId> = (0x10..0x18).map(peer).collect();
    let weights = Arc::new(ValidatorWeights::from_weights(
        validators.iter().map(|v| (*v, 25)),
    ));
    let controller = Arc::new(
        InboundAdmissionController::new("load", &Registry::new(), weights, small_node()).unwrap(),
    );
    let before = controller.stats();
    let throttler: Arc<dyn InboundMsgThrottler> = controller.clone();

    let mut rng = StdRng::seed_from_u64(0x18);
    let mut tasks = Vec::new();
    for i in 0..400 {
        let sender = if i % 3 == 0 {
            validators[rng.gen_range(0..validators.len())]
        } else {
            outsiders[rng.gen_range(0..outsiders.len())]
        };
        // Never above the per-peer cap, so every request can eventually fit
        let size = rng.gen_range(1..=200u64);
        let hold = rng.gen_range(0..3u64);
        let throttler = throttler.clone();
        tasks.push(tokio::spawn(async move {
            throttler.acquire(size, sender).await;
            if hold > 0 {
                tokio::time::sleep(Duration::from_millis(hold)).await;
            }
            throttler.release(size, sender);
        }));
    }

    let all = async {
        for task in tasks {
            task.await.unwrap();
        }
    };
    timeout(Duration::from_secs(30), all)
        .await
        .expect("admissions deadlocked");

    assert_eq!(controller.stats(), before);
    assert_eq!(controller.metrics().msgs_in_flight.get(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abandoned_requests_leave_no_residue() {
    init_tracing();
    let throttler = Arc::new(
        InboundAdmissionController::new(
            "abandon",
            &Registry::new(),
            Arc::new(ValidatorWeights::new()),
            small_node(),
        )
        .unwrap(),
    );
    let before = throttler.stats();

    let mut tasks = Vec::new();
    for i in 0..64u8 {
        let throttler = throttler.clone();
        let sender = peer(i % 8);
        tasks.push(tokio::spawn(async move {
            // Short deadlines so some requests give up while queued
            let deadline = Duration::from_millis(u64::from(i % 4));
            if timeout(deadline, throttler.acquire(150, sender)).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(1)).await;
                throttler.release(150, sender);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(throttler.stats(), before);
}
