//! Integration tests for the reservation workflow against in-memory stores.
//!
//! Covers the four canonical outcomes (success, insufficient stock,
//! concurrency abort, lock unavailable), infrastructure failures, and the
//! no-oversell property under real thread-level concurrency.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use stockguard_core::{
    DelayRange, FastStore, ItemId, PurchaseError, PurchaseRequest, RequestError, Requester,
    ReservationConfig,
};
use std::time::Duration;
use stockguard_runtime::{ChannelTaskLane, ReservationOrchestrator};
use stockguard_testing::{InMemoryFastStore, InMemoryLedger, RecordingTaskQueue};

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    store: InMemoryFastStore,
    ledger: Arc<InMemoryLedger>,
    queue: Arc<RecordingTaskQueue>,
    orchestrator: ReservationOrchestrator<InMemoryFastStore, InMemoryLedger>,
}

fn fast_config() -> ReservationConfig {
    ReservationConfig {
        lock_max_retries: 5,
        lock_retry_delay: DelayRange::new(1, 3),
        ..ReservationConfig::default()
    }
}

fn harness_with(config: &ReservationConfig) -> Harness {
    stockguard_testing::init_test_tracing();
    let store = InMemoryFastStore::new();
    let ledger = Arc::new(InMemoryLedger::new());
    let queue = Arc::new(RecordingTaskQueue::new());
    let orchestrator = ReservationOrchestrator::new(
        store.clone(),
        Arc::clone(&ledger),
        queue.clone(),
        config,
    );
    Harness {
        store,
        ledger,
        queue,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(&fast_config())
}

fn request(item_id: ItemId, quantity: u32) -> PurchaseRequest {
    PurchaseRequest::new(item_id, quantity, Requester::User(42), 1000).unwrap()
}

// ============================================================================
// Canonical Scenarios
// ============================================================================

#[tokio::test]
async fn purchase_hydrates_cold_cache_and_commits() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 100);

    let receipt = h.orchestrator.purchase(&request(item, 3)).await.unwrap();

    assert_eq!(receipt.item_id, item);
    assert_eq!(receipt.quantity, 3);
    assert_eq!(receipt.remaining, 97);
    assert_eq!(h.store.count(item), Some(97));

    let tasks = h.queue.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].item_id, item);
    assert_eq!(tasks[0].quantity, 3);
    assert_eq!(tasks[0].attempt, 0);
    assert_eq!(tasks[0].task_id, receipt.task_id);

    assert_eq!(h.ledger.stock(item), Some(100), "ledger is updated asynchronously");
    assert!(!h.store.is_locked(item));
    assert_eq!(h.store.lock_releases(), 1);
}

#[tokio::test]
async fn insufficient_stock_reports_current_count() {
    let h = harness();
    let item = h.ledger.insert("Super Device", 2);

    let err = h.orchestrator.purchase(&request(item, 5)).await.unwrap_err();

    assert_eq!(err, PurchaseError::InsufficientStock { current_stock: 2 });
    assert_eq!(err.error_code(), "INSUFFICIENT_STOCK");
    assert!(err.is_business_error());
    assert_eq!(h.store.count(item), Some(2));
    assert_eq!(h.store.commits(), 0);
    assert!(h.queue.is_empty());
    assert!(!h.store.is_locked(item));
}

#[tokio::test]
async fn concurrent_write_aborts_without_side_effects() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.store.set_count(item, 10).await.unwrap();
    h.store.abort_next_decrements(1);

    let err = h.orchestrator.purchase(&request(item, 1)).await.unwrap_err();

    assert_eq!(err, PurchaseError::ConcurrencyConflict);
    assert_eq!(err.error_code(), "SYSTEM_BUSY");
    assert_eq!(h.store.count(item), Some(10));
    assert!(h.queue.is_empty());
    assert!(!h.store.is_locked(item));
}

#[tokio::test]
async fn held_lock_fails_fast_without_touching_stores() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.store.hold_lock_forever(true);

    let err = h.orchestrator.purchase(&request(item, 1)).await.unwrap_err();

    assert_eq!(err, PurchaseError::LockUnavailable);
    assert_eq!(err.error_code(), "SYSTEM_BUSY");
    assert_eq!(h.ledger.find_calls(), 0);
    assert_eq!(h.store.count(item), None);
    assert_eq!(h.store.lock_releases(), 0, "a lock never taken is never released");
    assert!(h.queue.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_of_six_from_ten_sell_once() {
    let h = Arc::new(harness());
    let item = h.ledger.insert("Fashion Gadget", 10);

    let buyers: Vec<_> = (0..2)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                // A retryable failure is retried the way a caller would.
                let mut result = h.orchestrator.purchase(&request(item, 6)).await;
                for _ in 0..10 {
                    match &result {
                        Err(e) if e.is_retryable() => {
                            result = h.orchestrator.purchase(&request(item, 6)).await;
                        }
                        _ => break,
                    }
                }
                result
            })
        })
        .collect();

    let mut sold = 0;
    let mut refused = Vec::new();
    for buyer in buyers {
        match buyer.await.unwrap() {
            Ok(receipt) => {
                sold += 1;
                assert_eq!(receipt.remaining, 4);
            }
            Err(e) => refused.push(e),
        }
    }

    assert_eq!(sold, 1);
    assert_eq!(refused, vec![PurchaseError::InsufficientStock { current_stock: 4 }]);
    assert_eq!(h.store.count(item), Some(4));
    assert_eq!(h.queue.len(), 1);
    assert!(!h.store.is_locked(item));
}

// ============================================================================
// Request Limits
// ============================================================================

#[tokio::test]
async fn quantity_above_configured_limit_is_rejected_before_locking() {
    let h = harness_with(&ReservationConfig {
        max_quantity_per_purchase: 5,
        ..fast_config()
    });
    let item = h.ledger.insert("Fashion Gadget", 100);

    // Built against a looser bound than the orchestrator enforces.
    let err = h.orchestrator.purchase(&request(item, 50)).await.unwrap_err();

    assert_eq!(
        err,
        PurchaseError::InvalidRequest(RequestError::QuantityOutOfRange {
            min: 1,
            max: 5,
            actual: 50
        })
    );
    assert!(err.is_business_error());
    assert_eq!(h.store.lock_acquisitions(), 0);
    assert_eq!(h.ledger.find_calls(), 0);
    assert_eq!(h.store.count(item), None);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn orchestrator_builds_requests_within_its_limit() {
    let h = harness_with(&ReservationConfig {
        max_quantity_per_purchase: 5,
        ..fast_config()
    });
    let item = h.ledger.insert("Super Device", 100);

    assert_eq!(
        h.orchestrator.request(item, 6, Requester::Guest),
        Err(RequestError::QuantityOutOfRange {
            min: 1,
            max: 5,
            actual: 6
        })
    );

    let request = h.orchestrator.request(item, 5, Requester::Guest).unwrap();
    let receipt = h.orchestrator.purchase(&request).await.unwrap();
    assert_eq!(receipt.remaining, 95);
}

// ============================================================================
// Hydration
// ============================================================================

#[tokio::test]
async fn ledger_is_read_once_per_cold_key() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 100);

    h.orchestrator.purchase(&request(item, 1)).await.unwrap();
    h.orchestrator.purchase(&request(item, 1)).await.unwrap();
    h.orchestrator.purchase(&request(item, 1)).await.unwrap();

    assert_eq!(h.ledger.find_calls(), 1);
    assert_eq!(h.store.count(item), Some(97));
    assert_eq!(h.queue.len(), 3);
}

#[tokio::test]
async fn warm_cache_wins_over_ledger() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 100);
    h.store.set_count(item, 4).await.unwrap();

    let err = h.orchestrator.purchase(&request(item, 5)).await.unwrap_err();

    assert_eq!(err, PurchaseError::InsufficientStock { current_stock: 4 });
    assert_eq!(h.ledger.find_calls(), 0);
}

#[tokio::test]
async fn missing_and_deleted_items_are_not_found() {
    let h = harness();
    let deleted = h.ledger.insert("Retired", 10);
    h.ledger.soft_delete(deleted);

    let missing = h.orchestrator.purchase(&request(ItemId::new(999), 1)).await;
    let gone = h.orchestrator.purchase(&request(deleted, 1)).await;

    assert_eq!(missing.unwrap_err(), PurchaseError::RecordNotFound);
    assert_eq!(gone.unwrap_err(), PurchaseError::RecordNotFound);
    assert_eq!(h.store.count(deleted), None);
    assert!(!h.store.is_locked(deleted));
}

#[tokio::test]
async fn ledger_failure_during_hydration_is_unknown() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.ledger.fail_next(1);

    let err = h.orchestrator.purchase(&request(item, 1)).await.unwrap_err();

    assert_eq!(err, PurchaseError::Unknown);
    assert_eq!(err.error_code(), "UNKNOWN_ERROR");
    assert_eq!(h.store.count(item), None);
    assert!(!h.store.is_locked(item));
}

// ============================================================================
// Infrastructure Failures
// ============================================================================

#[tokio::test]
async fn failed_ping_is_store_unavailable_and_releases_lock() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.store.fail_ping(true);

    let err = h.orchestrator.purchase(&request(item, 1)).await.unwrap_err();

    assert_eq!(err, PurchaseError::StoreUnavailable);
    assert_eq!(h.store.lock_acquisitions(), 1);
    assert_eq!(h.store.lock_releases(), 1);
    assert!(!h.store.is_locked(item));
}

#[tokio::test]
async fn failed_store_read_is_store_unavailable() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.store.fail_reads(true);

    let err = h.orchestrator.purchase(&request(item, 1)).await.unwrap_err();

    assert_eq!(err, PurchaseError::StoreUnavailable);
    assert!(!h.store.is_locked(item));
}

#[tokio::test]
async fn failed_transaction_is_a_conflict() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.store.fail_next_decrements(1);

    let err = h.orchestrator.purchase(&request(item, 1)).await.unwrap_err();

    assert_eq!(err, PurchaseError::ConcurrencyConflict);
    assert_eq!(h.store.count(item), Some(10));
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn enqueue_failure_keeps_the_sale_and_reports_it() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.queue.fail_enqueues(true);

    let err = h.orchestrator.purchase(&request(item, 2)).await.unwrap_err();

    assert_eq!(err, PurchaseError::EnqueueFailed);
    assert_eq!(err.error_code(), "UNKNOWN_ERROR");
    assert_eq!(h.store.count(item), Some(8), "the fast store decrement is not undone");
    assert!(!h.store.is_locked(item));
}

#[tokio::test]
async fn full_lane_fails_dispatch_without_blocking() {
    stockguard_testing::init_test_tracing();
    let store = InMemoryFastStore::new();
    let ledger = Arc::new(InMemoryLedger::new());
    let item = ledger.insert("Fashion Gadget", 10);
    let lane = Arc::new(ChannelTaskLane::bounded(1));
    let orchestrator =
        ReservationOrchestrator::new(store.clone(), ledger, lane.clone(), &fast_config());

    orchestrator.purchase(&request(item, 1)).await.unwrap();
    assert_eq!(lane.pending(), 1);

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.purchase(&request(item, 1)),
    )
    .await
    .expect("dispatch must not wait for lane capacity")
    .unwrap_err();

    assert_eq!(err, PurchaseError::EnqueueFailed);
    assert_eq!(store.count(item), Some(8), "the fast store decrement is not undone");
    assert!(!store.is_locked(item));
    assert_eq!(lane.pending(), 1);
}

#[tokio::test]
async fn lock_release_failure_does_not_change_the_outcome() {
    let h = harness();
    let item = h.ledger.insert("Fashion Gadget", 10);
    h.store.fail_lock_release(true);

    let receipt = h.orchestrator.purchase(&request(item, 1)).await.unwrap();

    assert_eq!(receipt.remaining, 9);
    assert_eq!(h.store.lock_releases(), 1);
}

// ============================================================================
// No Oversell
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buyers_never_oversell() {
    let config = ReservationConfig {
        lock_max_retries: 50,
        lock_retry_delay: DelayRange::new(1, 5),
        ..ReservationConfig::default()
    };
    let h = Arc::new(harness_with(&config));
    let item = h.ledger.insert("Super Device", 10);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.orchestrator.purchase(&request(item, 1)).await })
        })
        .collect();

    let mut sold = 0_i64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sold += 1,
            Err(e) => assert!(
                matches!(
                    e,
                    PurchaseError::InsufficientStock { .. }
                        | PurchaseError::ConcurrencyConflict
                        | PurchaseError::LockUnavailable
                ),
                "unexpected error: {e:?}"
            ),
        }
    }

    assert!(sold <= 10);
    assert_eq!(h.store.count(item), Some(10 - sold));
    assert_eq!(h.queue.len(), usize::try_from(sold).unwrap());
    assert!(!h.store.is_locked(item));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn guarded_decrement_holds_without_the_lock() {
    use stockguard_core::{DecrementResult, FastSession};

    let store = InMemoryFastStore::new();
    let item = ItemId::new(1);
    store.set_count(item, 5).await.unwrap();

    // Bypass the lock entirely: only WATCH protects the counter here.
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut session = store.session().await.unwrap();
                session.watch(item).await.unwrap();
                let count = session.get_count(item).await.unwrap().unwrap();
                if count < 1 {
                    return false;
                }
                matches!(
                    session.decrement_atomic(item, 1).await,
                    DecrementResult::Committed(_)
                )
            })
        })
        .collect();

    let mut committed = 0_i64;
    for handle in handles {
        if handle.await.unwrap() {
            committed += 1;
        }
    }

    let remaining = store.count(item).unwrap();
    assert!(remaining >= 0);
    assert_eq!(remaining, 5 - committed);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn sold_units_never_exceed_stock(
            stock in 0_u32..20,
            quantities in proptest::collection::vec(1_u32..5, 1..24),
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            let (sold, remaining) = runtime.block_on(async {
                let config = ReservationConfig {
                    lock_max_retries: 3,
                    lock_retry_delay: DelayRange::new(0, 2),
                    ..ReservationConfig::default()
                };
                let h = Arc::new(harness_with(&config));
                let item = h.ledger.insert("Fashion Gadget", stock);

                let handles: Vec<_> = quantities
                    .iter()
                    .map(|&quantity| {
                        let h = Arc::clone(&h);
                        tokio::spawn(async move {
                            h.orchestrator
                                .purchase(&request(item, quantity))
                                .await
                                .map(|receipt| i64::from(receipt.quantity))
                        })
                    })
                    .collect();

                let mut sold = 0_i64;
                for handle in handles {
                    if let Ok(quantity) = handle.await.unwrap() {
                        sold += quantity;
                    }
                }
                (sold, h.store.count(item))
            });

            prop_assert!(sold <= i64::from(stock));
            if let Some(remaining) = remaining {
                prop_assert!(remaining >= 0);
                prop_assert_eq!(remaining, i64::from(stock) - sold);
            }
        }
    }
}
