//! Coordinator errors.

use std::time::Duration;

use allocsync_exclusive::ExclusiveError;
use allocsync_id::IndexerId;
use allocsync_rebalance::{InvalidRebalanceInput, RebalanceError};

use crate::source::SourceError;
use crate::store::StoreError;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that can occur while reconciling an indexer.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("rebalance failed: {0}")]
    Rebalance(#[from] RebalanceError),

    #[error("stake source error: {0}")]
    Source(#[from] SourceError),

    #[error("allocation store error: {0}")]
    Store(#[from] StoreError),

    /// The reconciliation may still complete in the background.
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),

    #[error("reconciliation task was cancelled")]
    Cancelled,

    #[error("retries exhausted for indexer {0}")]
    RetriesExhausted(IndexerId),
}

impl From<InvalidRebalanceInput> for CoordinatorError {
    fn from(err: InvalidRebalanceInput) -> Self {
        Self::Rebalance(err.into())
    }
}

impl From<ExclusiveError<CoordinatorError>> for CoordinatorError {
    fn from(err: ExclusiveError<CoordinatorError>) -> Self {
        match err {
            ExclusiveError::Timeout(after) => Self::Timeout(after),
            ExclusiveError::Cancelled => Self::Cancelled,
            ExclusiveError::Operation(e) => e,
        }
    }
}

impl CoordinatorError {
    /// Returns true if retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Source(_) | Self::Store(_) | Self::Timeout(_) | Self::Cancelled
        )
    }
}
