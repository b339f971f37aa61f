//! Reconcile background worker.
//!
//! Runs a reconciliation pass over every managed indexer on a periodic
//! interval, and reconciles single indexers on demand when something (an
//! on-chain event listener, an operator) sends a trigger.

use std::sync::Arc;
use std::time::Duration;

use allocsync_id::IndexerId;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::source::StakeSource;
use crate::store::AllocationStore;

/// Capacity of the trigger queue.
const TRIGGER_BUFFER: usize = 256;

/// Requests out-of-band reconciliation of a single indexer.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<IndexerId>,
}

impl TriggerHandle {
    /// Queue a reconcile for `indexer`.
    ///
    /// Returns false if the worker has stopped.
    pub async fn trigger(&self, indexer: IndexerId) -> bool {
        self.tx.send(indexer).await.is_ok()
    }
}

/// Worker that drives the reconciler.
pub struct ReconcileWorker<S, A> {
    reconciler: Arc<Reconciler<S, A>>,
    indexers: Vec<IndexerId>,
    interval: Duration,
    triggers: mpsc::Receiver<IndexerId>,
}

impl<S, A> ReconcileWorker<S, A>
where
    S: StakeSource,
    A: AllocationStore,
{
    /// Create a new worker and the handle used to trigger it.
    pub fn new(
        reconciler: Arc<Reconciler<S, A>>,
        indexers: Vec<IndexerId>,
        interval: Duration,
    ) -> (Self, TriggerHandle) {
        let (tx, triggers) = mpsc::channel(TRIGGER_BUFFER);
        let worker = Self {
            reconciler,
            indexers,
            interval,
            triggers,
        };
        (worker, TriggerHandle { tx })
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            indexer_count = self.indexers.len(),
            "Starting reconcile worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        let mut triggers_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.reconciler.reconcile_all(&self.indexers).await;
                    if stats.indexers_failed > 0 {
                        warn!(failed = stats.indexers_failed, "Reconciliation pass had failures");
                    }
                }
                trigger = self.triggers.recv(), if triggers_open => {
                    match trigger {
                        Some(indexer) => self.spawn_triggered(indexer),
                        None => {
                            debug!("All trigger handles dropped");
                            triggers_open = false;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Triggered reconciles run on their own task so a slow indexer doesn't
    /// hold up the trigger queue. The reconciler's lock keeps them from
    /// racing the periodic pass.
    fn spawn_triggered(&self, indexer: IndexerId) {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::spawn(async move {
            match reconciler.reconcile(indexer).await {
                Ok(ReconcileOutcome::Rebalanced { delta, changed, .. }) => {
                    info!(indexer = %indexer, delta = %delta, changed, "Triggered reconcile rebalanced");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(indexer = %indexer, error = %e, "Triggered reconcile failed");
                }
            }
        });
    }
}
