//! Allocation reconciler.
//!
//! For each indexer, the reconciler is responsible for:
//! - Reading the tracked allocations and the on-chain used stake
//! - Computing the drift between the two
//! - Spreading the drift over the allocations with the rebalancer
//! - Writing the new allocation set back, replace-all
//!
//! The whole read-compute-write runs inside the indexer's key of a shared
//! `KeyedMutex`, so a periodic pass and an event-triggered reconcile for the
//! same indexer never interleave.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use allocsync_exclusive::KeyedMutex;
use allocsync_id::IndexerId;
use allocsync_rebalance::{rebalance, Amount, SignedAmount};
use futures_util::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::retry::RetryTracker;
use crate::source::StakeSource;
use crate::store::AllocationStore;

/// What a single reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Tracked allocations already matched the used stake.
    Unchanged { total: Amount },

    /// The drift was distributed and persisted.
    Rebalanced {
        delta: SignedAmount,
        /// Allocations whose amount changed.
        changed: usize,
        total: Amount,
    },

    /// Drift exists but there are no allocations to spread it over.
    Skipped { delta: SignedAmount },
}

/// Statistics from a reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub indexers_processed: u32,
    pub indexers_rebalanced: u32,
    pub indexers_unchanged: u32,
    pub indexers_skipped: u32,
    pub indexers_failed: u32,
}

impl ReconcileStats {
    fn record(&mut self, outcome: &CoordinatorResult<ReconcileOutcome>) {
        match outcome {
            Ok(outcome) => {
                self.indexers_processed += 1;
                match outcome {
                    ReconcileOutcome::Unchanged { .. } => self.indexers_unchanged += 1,
                    ReconcileOutcome::Rebalanced { .. } => self.indexers_rebalanced += 1,
                    ReconcileOutcome::Skipped { .. } => self.indexers_skipped += 1,
                }
            }
            Err(_) => self.indexers_failed += 1,
        }
    }
}

/// Reconciles indexers' tracked allocations against their used stake.
pub struct Reconciler<S, A> {
    source: Arc<S>,
    store: Arc<A>,
    locks: KeyedMutex<IndexerId>,
    op_timeout: Duration,
    retries: Arc<Mutex<RetryTracker>>,
}

impl<S, A> Reconciler<S, A>
where
    S: StakeSource,
    A: AllocationStore,
{
    /// Create a reconciler with its own lock registry.
    pub fn new(source: Arc<S>, store: Arc<A>, config: &Config) -> Self {
        Self::with_locks(source, store, KeyedMutex::new(), config)
    }

    /// Create a reconciler sharing a lock registry with other writers of the
    /// same allocation table.
    pub fn with_locks(
        source: Arc<S>,
        store: Arc<A>,
        locks: KeyedMutex<IndexerId>,
        config: &Config,
    ) -> Self {
        Self {
            source,
            store,
            locks,
            op_timeout: config.op_timeout,
            retries: Arc::new(Mutex::new(RetryTracker::new(
                config.max_retries,
                config.retry_window,
            ))),
        }
    }

    /// The lock registry guarding allocation writes.
    pub fn locks(&self) -> &KeyedMutex<IndexerId> {
        &self.locks
    }

    /// Reconcile one indexer.
    ///
    /// On timeout the reconciliation keeps running in the background and
    /// still holds the indexer's key until it finishes; if it then succeeds
    /// it clears the indexer's failure count itself.
    ///
    /// Only transient failures count toward retries. Invalid input and
    /// invariant violations are returned as they are on every attempt.
    #[instrument(skip_all, fields(indexer = %indexer))]
    pub async fn reconcile(&self, indexer: IndexerId) -> CoordinatorResult<ReconcileOutcome> {
        if self.is_exhausted(&indexer) {
            debug!("Skipping indexer with exhausted retries");
            return Err(CoordinatorError::RetriesExhausted(indexer));
        }

        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);
        let retries = Arc::clone(&self.retries);
        let result = self
            .locks
            .run_exclusive_with_timeout(indexer, self.op_timeout, move || async move {
                let result = reconcile_locked(source.as_ref(), store.as_ref(), indexer).await;
                if result.is_ok() {
                    lock_retries(&retries).clear(&indexer);
                }
                result
            })
            .await
            .map_err(CoordinatorError::from);

        if let Err(e) = &result {
            if !e.is_transient() {
                error!(error = %e, "Reconcile failed permanently");
            }
        }
        if lock_retries(&self.retries).observe(indexer, &result) {
            warn!("Retries exhausted for indexer");
        }

        result
    }

    /// Whether the indexer is currently skipped for repeated transient failures.
    pub fn is_exhausted(&self, indexer: &IndexerId) -> bool {
        lock_retries(&self.retries).is_exhausted(indexer)
    }

    /// Reconcile many indexers concurrently. One failure never stops the pass.
    #[instrument(skip(self, indexers), fields(indexer_count = indexers.len()))]
    pub async fn reconcile_all(&self, indexers: &[IndexerId]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        let results = join_all(indexers.iter().map(|indexer| self.reconcile(*indexer))).await;

        for (indexer, result) in indexers.iter().zip(&results) {
            if let Err(e) = result {
                warn!(indexer = %indexer, error = %e, "Failed to reconcile indexer");
            }
            stats.record(result);
        }

        lock_retries(&self.retries).prune();

        info!(
            indexers_processed = stats.indexers_processed,
            indexers_rebalanced = stats.indexers_rebalanced,
            indexers_failed = stats.indexers_failed,
            "Reconciliation pass complete"
        );

        stats
    }
}

fn lock_retries(retries: &Mutex<RetryTracker>) -> MutexGuard<'_, RetryTracker> {
    retries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The critical section: read, rebalance, write. Caller holds the indexer's key.
async fn reconcile_locked<S, A>(
    source: &S,
    store: &A,
    indexer: IndexerId,
) -> CoordinatorResult<ReconcileOutcome>
where
    S: StakeSource + ?Sized,
    A: AllocationStore + ?Sized,
{
    let allocations = store.load(&indexer).await?;
    let used = source.used_stake(&indexer).await?;
    let tracked = allocations.total()?;
    let delta = SignedAmount::difference(used, tracked);

    if delta.is_zero() {
        debug!(total = %tracked, "Allocations match used stake");
        return Ok(ReconcileOutcome::Unchanged { total: tracked });
    }

    if allocations.is_empty() {
        warn!(used = %used, "Used stake drifted but no allocations are tracked");
        return Ok(ReconcileOutcome::Skipped { delta });
    }

    let result = rebalance(&allocations, delta)?;
    let updated = result.apply(&allocations)?;
    store.replace(&indexer, updated).await?;

    info!(
        delta = %delta,
        tracked = %tracked,
        used = %used,
        changed = result.changed(),
        "Rebalanced allocations"
    );

    Ok(ReconcileOutcome::Rebalanced {
        delta,
        changed: result.changed(),
        total: used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryAllocationStore, InMemoryStakeSource};
    use allocsync_id::DeploymentId;
    use allocsync_rebalance::{Allocation, AllocationSet};

    fn indexer() -> IndexerId {
        IndexerId::from_bytes([7; 20])
    }

    fn deployment(byte: u8) -> DeploymentId {
        DeploymentId::from_bytes([byte; 32])
    }

    async fn setup(
        amounts: &[u64],
        used: u64,
    ) -> Reconciler<InMemoryStakeSource, InMemoryAllocationStore> {
        let source = Arc::new(InMemoryStakeSource::new());
        let store = Arc::new(InMemoryAllocationStore::new());
        let set: AllocationSet<DeploymentId> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| Allocation::new(deployment(i as u8), *amount))
            .collect();
        store.seed(indexer(), set).await;
        source.set_used(indexer(), used).await;
        Reconciler::new(source, store, &Config::default())
    }

    #[tokio::test]
    async fn test_reduction_persisted() {
        let reconciler = setup(&[100, 200, 300], 540).await;

        let outcome = reconciler.reconcile(indexer()).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Rebalanced { ref delta, .. } if delta.to_string() == "-60"
        ));
        let stored = reconciler.store.load(&indexer()).await.unwrap();
        assert_eq!(stored.total().unwrap(), Amount::from(540u64));
        assert_eq!(reconciler.store.writes(), 1);
        assert!(reconciler.locks().is_empty());
    }

    #[tokio::test]
    async fn test_matching_totals_left_alone() {
        let reconciler = setup(&[100, 200], 300).await;

        let outcome = reconciler.reconcile(indexer()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Unchanged {
                total: Amount::from(300u64)
            }
        );
        assert_eq!(reconciler.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_drift_without_allocations_skipped() {
        let reconciler = setup(&[], 10).await;
        let outcome = reconciler.reconcile(indexer()).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_unknown_indexer_fails_and_counts() {
        let reconciler = setup(&[1], 1).await;
        let other = IndexerId::from_bytes([8; 20]);

        let stats = reconciler.reconcile_all(&[indexer(), other]).await;

        assert_eq!(stats.indexers_processed, 1);
        assert_eq!(stats.indexers_unchanged, 1);
        assert_eq!(stats.indexers_failed, 1);
    }
}
