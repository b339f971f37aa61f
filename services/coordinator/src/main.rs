//! allocsync coordinator
//!
//! Runs the reconcile worker over the configured indexers until ctrl-c.
//! The stake source and allocation store are the in-memory collaborators,
//! optionally seeded from `ALLOCSYNC_SEED_FILE`.

use std::sync::Arc;
use std::time::Duration;

use allocsync_coordinator::{
    memory::{InMemoryAllocationStore, InMemoryStakeSource, Seed},
    Config, ReconcileWorker, Reconciler,
};
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long the worker gets to finish its current pass after ctrl-c.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to ALLOCSYNC_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting allocsync coordinator");
    info!(
        indexers = config.indexers.len(),
        reconcile_interval = ?config.reconcile_interval,
        op_timeout = ?config.op_timeout,
        max_retries = config.max_retries,
        "Configuration loaded"
    );

    let source = Arc::new(InMemoryStakeSource::new());
    let store = Arc::new(InMemoryAllocationStore::new());

    match &config.seed_file {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read seed file {}", path.display()))?;
            let seed = Seed::from_json(&text)
                .with_context(|| format!("invalid seed file {}", path.display()))?;
            info!(
                path = %path.display(),
                indexers = seed.indexers.len(),
                "Seeding in-memory collaborators"
            );
            seed.apply(&source, &store).await;
        }
        None => warn!("ALLOCSYNC_SEED_FILE not set, starting with empty allocations"),
    }

    let reconciler = Arc::new(Reconciler::new(source, store, &config));
    let (worker, _trigger) =
        ReconcileWorker::new(reconciler, config.indexers.clone(), config.reconcile_interval);

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, worker_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Reconcile worker panicked"),
        Err(_) => warn!("Reconcile worker did not shut down in time"),
    }

    info!("Coordinator shutdown complete");
    Ok(())
}
