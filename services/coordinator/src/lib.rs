//! allocsync coordinator library.
//!
//! Keeps an indexer's tracked per-deployment allocations in line with the
//! stake the chain says it has in use. The pieces:
//!
//! - [`StakeSource`] / [`AllocationStore`]: the on-chain read and the
//!   allocation table, supplied by the embedding service
//! - [`Reconciler`]: one reconciliation per indexer, serialized per indexer
//! - [`ReconcileWorker`]: periodic passes plus on-demand triggers

pub mod config;
pub mod error;
pub mod memory;
pub mod reconciler;
pub mod retry;
pub mod source;
pub mod store;
pub mod worker;

pub use config::Config;
pub use error::{CoordinatorError, CoordinatorResult};
pub use reconciler::{ReconcileOutcome, ReconcileStats, Reconciler};
pub use source::{SourceError, StakeSource};
pub use store::{AllocationStore, StoreError};
pub use worker::{ReconcileWorker, TriggerHandle};
