//! Reservation orchestrator: the purchase state machine.
//!
//! ```text
//! LOCKING ─▶ HYDRATING ─▶ VALIDATING ─▶ COMMITTING ─▶ DISPATCHING ─▶ DONE
//!    │           │             │             │              │
//!    └───────────┴─────────────┴─────────────┴──────────────┴──▶ FAILED(kind)
//! ```
//!
//! The lock is held from HYDRATING through DISPATCHING and released on every
//! exit. It only limits how many callers attempt a mutation at once; the
//! WATCH-guarded decrement in COMMITTING is what prevents overselling, and it
//! still holds if a lease expires while its owner is inside.
//!
//! Once COMMITTING succeeds the sale is final. Reconciling the ledger is
//! handed to the task queue and never blocks the caller.

use crate::lock::LockCoordinator;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use stockguard_core::{
    DecrementResult, DurableLedger, FastSession, FastStore, ItemId, PurchaseError,
    PurchaseRequest, ReconciliationTask, RequestError, Requester, ReservationConfig, StockRecord,
    StoreError, TaskId, TaskQueue,
};

/// Stage of a reservation attempt inside the locked region, used as log
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStage {
    /// Reading or seeding the fast count
    Hydrating,
    /// Comparing the count with the request
    Validating,
    /// Running the guarded decrement
    Committing,
    /// Handing the reconciliation task to the queue
    Dispatching,
}

impl fmt::Display for ReservationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hydrating => "hydrating",
            Self::Validating => "validating",
            Self::Committing => "committing",
            Self::Dispatching => "dispatching",
        };
        f.write_str(name)
    }
}

/// Proof of a committed reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationReceipt {
    /// Item sold
    pub item_id: ItemId,
    /// Units sold
    pub quantity: u32,
    /// Fast count after the decrement
    pub remaining: i64,
    /// Task that will reconcile the ledger
    pub task_id: TaskId,
}

/// Sells stock from the fast store and schedules ledger reconciliation.
///
/// Every collaborator is injected; the orchestrator keeps no mutable state
/// of its own, so one instance can serve any number of concurrent callers.
pub struct ReservationOrchestrator<S, L> {
    store: S,
    ledger: Arc<L>,
    queue: Arc<dyn TaskQueue>,
    locks: LockCoordinator<S>,
    max_quantity: u32,
}

impl<S, L> ReservationOrchestrator<S, L>
where
    S: FastStore,
    L: DurableLedger,
{
    /// Wire an orchestrator from its collaborators and settings.
    #[must_use]
    pub fn new(store: S, ledger: Arc<L>, queue: Arc<dyn TaskQueue>, config: &ReservationConfig) -> Self {
        let locks = LockCoordinator::with_log_budget(
            store.clone(),
            config.lock_policy(),
            config.lock_failure_log_budget,
            config.lock_failure_log_window(),
        );
        Self {
            store,
            ledger,
            queue,
            locks,
            max_quantity: config.max_quantity_per_purchase,
        }
    }

    /// Build a request bounded by the configured maximum quantity.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for a non-positive item id or a quantity
    /// outside `1..=max_quantity_per_purchase`.
    pub fn request(
        &self,
        item_id: ItemId,
        quantity: u32,
        requester: Requester,
    ) -> Result<PurchaseRequest, RequestError> {
        PurchaseRequest::new(item_id, quantity, requester, self.max_quantity)
    }

    /// Lock coordinator used for the item locks.
    #[must_use]
    pub const fn locks(&self) -> &LockCoordinator<S> {
        &self.locks
    }

    /// Run one purchase attempt.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::InvalidRequest`] - quantity above the configured maximum
    /// - [`PurchaseError::LockUnavailable`] - lock retries exhausted
    /// - [`PurchaseError::StoreUnavailable`] - fast store ping or read failed
    /// - [`PurchaseError::RecordNotFound`] - no purchasable ledger record
    /// - [`PurchaseError::InsufficientStock`] - cached count below the quantity
    /// - [`PurchaseError::ConcurrencyConflict`] - decrement aborted or failed
    /// - [`PurchaseError::EnqueueFailed`] - committed but not scheduled
    /// - [`PurchaseError::Unknown`] - ledger failure while hydrating
    pub async fn purchase(
        &self,
        request: &PurchaseRequest,
    ) -> Result<ReservationReceipt, PurchaseError> {
        let started = Instant::now();
        metrics::counter!("reservation_attempts_total").increment(1);

        let result = match self.check_quantity(request) {
            Err(e) => Err(e),
            // The coordinator has already logged an exhausted acquisition.
            Ok(()) => self
                .locks
                .with_lock(request.item_id(), request.requester(), || {
                    self.reserve_locked(request)
                })
                .await
                .unwrap_or(Err(PurchaseError::LockUnavailable)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.error_code(),
        };
        metrics::counter!("reservation_outcomes_total", "outcome" => outcome).increment(1);
        metrics::histogram!("reservation_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    /// Enforce the configured maximum on requests built elsewhere.
    fn check_quantity(&self, request: &PurchaseRequest) -> Result<(), PurchaseError> {
        if request.quantity() <= self.max_quantity {
            return Ok(());
        }
        tracing::info!(
            item_id = %request.item_id(),
            requested_quantity = request.quantity(),
            max_quantity = self.max_quantity,
            requester = %request.requester(),
            "Purchase rejected: quantity above limit"
        );
        Err(RequestError::QuantityOutOfRange {
            min: 1,
            max: self.max_quantity,
            actual: request.quantity(),
        }
        .into())
    }

    async fn reserve_locked(
        &self,
        request: &PurchaseRequest,
    ) -> Result<ReservationReceipt, PurchaseError> {
        let item_id = request.item_id();
        let quantity = request.quantity();
        let requester = request.requester();

        if let Err(e) = self.store.ping().await {
            tracing::error!(
                severity = "emergency",
                item_id = %item_id,
                requester = %requester,
                error = %e,
                "Fast store connection failed"
            );
            return Err(PurchaseError::StoreUnavailable);
        }

        let mut session = self
            .store
            .session()
            .await
            .map_err(|e| store_unavailable(item_id, request, ReservationStage::Hydrating, &e))?;

        let count = self.hydrate(&mut session, request).await?;

        if count < i64::from(quantity) {
            if let Err(e) = session.unwatch().await {
                tracing::debug!(item_id = %item_id, error = %e, "Unwatch failed; session is discarded anyway");
            }
            tracing::info!(
                item_id = %item_id,
                current_stock = count,
                requested_quantity = quantity,
                requester = %requester,
                stage = %ReservationStage::Validating,
                "Purchase failed: insufficient stock"
            );
            return Err(PurchaseError::InsufficientStock {
                current_stock: count,
            });
        }

        let remaining = match session.decrement_atomic(item_id, quantity).await {
            DecrementResult::Committed(remaining) => remaining,
            DecrementResult::Aborted => {
                tracing::warn!(
                    item_id = %item_id,
                    requester = %requester,
                    stage = %ReservationStage::Committing,
                    "Fast store transaction aborted: stock changed concurrently"
                );
                metrics::counter!("fast_store_transaction_aborts_total").increment(1);
                return Err(PurchaseError::ConcurrencyConflict);
            }
            DecrementResult::Failed(e) => {
                tracing::error!(
                    item_id = %item_id,
                    requester = %requester,
                    stage = %ReservationStage::Committing,
                    error = %e,
                    "Fast store transaction failed"
                );
                metrics::counter!("fast_store_transaction_failures_total").increment(1);
                return Err(PurchaseError::ConcurrencyConflict);
            }
        };
        drop(session);

        let task = ReconciliationTask::new(item_id, quantity);
        if let Err(e) = self.queue.enqueue(&task).await {
            tracing::error!(
                alert = true,
                item_id = %item_id,
                quantity,
                requester = %requester,
                task_id = %task.task_id,
                stage = %ReservationStage::Dispatching,
                error = %e,
                "Stock sold but reconciliation task could not be enqueued"
            );
            metrics::counter!("reconciliation_enqueue_failures_total").increment(1);
            return Err(PurchaseError::EnqueueFailed);
        }

        tracing::info!(
            item_id = %item_id,
            quantity,
            remaining,
            requester = %requester,
            task_id = %task.task_id,
            "Purchase successful"
        );

        Ok(ReservationReceipt {
            item_id,
            quantity,
            remaining,
            task_id: task.task_id,
        })
    }

    /// Watch the stock key and return the count, seeding it from the ledger
    /// on a cold cache. The ledger is read at most once.
    async fn hydrate(
        &self,
        session: &mut S::Session,
        request: &PurchaseRequest,
    ) -> Result<i64, PurchaseError> {
        let item_id = request.item_id();
        let stage = ReservationStage::Hydrating;
        let unavailable = |e: StoreError| store_unavailable(item_id, request, stage, &e);

        session.watch(item_id).await.map_err(unavailable)?;
        if let Some(count) = session.get_count(item_id).await.map_err(unavailable)? {
            return Ok(count);
        }

        let record = match self.ledger.find(item_id).await {
            Ok(record) => record.filter(StockRecord::is_purchasable),
            Err(e) => {
                let _ = session.unwatch().await;
                tracing::error!(
                    item_id = %item_id,
                    requester = %request.requester(),
                    stage = %stage,
                    error = %e,
                    "Ledger lookup failed during hydration"
                );
                return Err(PurchaseError::Unknown);
            }
        };

        let Some(record) = record else {
            let _ = session.unwatch().await;
            tracing::error!(
                item_id = %item_id,
                requester = %request.requester(),
                stage = %stage,
                "Item not found or soft-deleted"
            );
            return Err(PurchaseError::RecordNotFound);
        };

        let baseline = i64::from(record.stock);
        let seeded = session.seed_count(item_id, baseline).await.map_err(unavailable)?;
        tracing::debug!(item_id = %item_id, baseline, seeded, "Fast count hydrated from ledger");

        // Seeding touched the watched key; re-arm before reading it back.
        session.unwatch().await.map_err(unavailable)?;
        session.watch(item_id).await.map_err(unavailable)?;
        match session.get_count(item_id).await.map_err(unavailable)? {
            Some(count) => Ok(count),
            None => {
                tracing::warn!(item_id = %item_id, "Fast count vanished right after hydration");
                Err(PurchaseError::ConcurrencyConflict)
            }
        }
    }
}

fn store_unavailable(
    item_id: ItemId,
    request: &PurchaseRequest,
    stage: ReservationStage,
    error: &StoreError,
) -> PurchaseError {
    tracing::error!(
        item_id = %item_id,
        requester = %request.requester(),
        stage = %stage,
        error = %error,
        "Fast store operation failed"
    );
    PurchaseError::StoreUnavailable
}
