//! In-memory collaborators for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use allocsync_id::{DeploymentId, IndexerId};
use allocsync_rebalance::{AllocationSet, Amount};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::source::{SourceError, StakeSource};
use crate::store::{AllocationStore, StoreError};

/// Used-stake figures held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStakeSource {
    used: RwLock<HashMap<IndexerId, Amount>>,
}

impl InMemoryStakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the used stake the chain reports for an indexer.
    pub async fn set_used(&self, indexer: IndexerId, amount: impl Into<Amount>) {
        self.used.write().await.insert(indexer, amount.into());
    }
}

#[async_trait]
impl StakeSource for InMemoryStakeSource {
    async fn used_stake(&self, indexer: &IndexerId) -> Result<Amount, SourceError> {
        self.used
            .read()
            .await
            .get(indexer)
            .copied()
            .ok_or(SourceError::UnknownIndexer(*indexer))
    }
}

/// Allocation table held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAllocationStore {
    rows: RwLock<HashMap<IndexerId, AllocationSet<DeploymentId>>>,
    writes: AtomicU64,
}

impl InMemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an indexer's allocations without counting it as a write.
    pub async fn seed(&self, indexer: IndexerId, allocations: AllocationSet<DeploymentId>) {
        self.rows.write().await.insert(indexer, allocations);
    }

    /// Number of `replace` calls served.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AllocationStore for InMemoryAllocationStore {
    async fn load(&self, indexer: &IndexerId) -> Result<AllocationSet<DeploymentId>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .get(indexer)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        indexer: &IndexerId,
        allocations: AllocationSet<DeploymentId>,
    ) -> Result<(), StoreError> {
        self.rows.write().await.insert(*indexer, allocations);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Starting state for the in-memory collaborators.
///
/// ```json
/// { "indexers": [ { "indexer": "0x…", "used": "1500",
///                   "allocations": [ { "id": "0x…", "amount": "1000" } ] } ] }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    pub indexers: Vec<IndexerSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSeed {
    pub indexer: IndexerId,
    /// Used stake reported by the chain.
    pub used: Amount,
    #[serde(default)]
    pub allocations: AllocationSet<DeploymentId>,
}

impl Seed {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Load every indexer into the source and store. Seeding is not a write.
    pub async fn apply(self, source: &InMemoryStakeSource, store: &InMemoryAllocationStore) {
        for entry in self.indexers {
            source.set_used(entry.indexer, entry.used).await;
            store.seed(entry.indexer, entry.allocations).await;
        }
    }
}
