//! Persisted allocation rows.

use allocsync_id::{DeploymentId, IndexerId};
use allocsync_rebalance::AllocationSet;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the allocation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// The durable allocation table.
///
/// Every write for an indexer must happen while holding that indexer's key in
/// the coordinator's `KeyedMutex`; [`crate::Reconciler`] guarantees this for
/// its own writes.
#[async_trait]
pub trait AllocationStore: Send + Sync + 'static {
    /// Current allocations for the indexer. Unknown indexers have none.
    async fn load(&self, indexer: &IndexerId) -> Result<AllocationSet<DeploymentId>, StoreError>;

    /// Replaces all of the indexer's allocations.
    async fn replace(
        &self,
        indexer: &IndexerId,
        allocations: AllocationSet<DeploymentId>,
    ) -> Result<(), StoreError>;
}
