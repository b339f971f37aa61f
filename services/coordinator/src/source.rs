//! On-chain stake reads.

use allocsync_id::IndexerId;
use allocsync_rebalance::Amount;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the stake source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The chain has no record of the indexer.
    #[error("unknown indexer: {0}")]
    UnknownIndexer(IndexerId),

    /// The query itself failed (RPC, subgraph, decoding).
    #[error("query failed: {0}")]
    Query(String),
}

/// Supplies the stake an indexer currently has allocated on chain.
#[async_trait]
pub trait StakeSource: Send + Sync + 'static {
    /// Total stake the indexer has in use, in minor units.
    async fn used_stake(&self, indexer: &IndexerId) -> Result<Amount, SourceError>;
}
