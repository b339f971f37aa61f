//! Coordinator configuration.

use std::path::PathBuf;
use std::time::Duration;

use allocsync_id::IndexerId;
use anyhow::{Context, Result};

use crate::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WINDOW};

/// Default interval between periodic reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for one indexer's reconciliation, queue time included.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct Config {
    /// Indexers this coordinator manages.
    pub indexers: Vec<IndexerId>,

    /// Interval between periodic reconciliation passes.
    pub reconcile_interval: Duration,

    /// Deadline for a single indexer's reconciliation.
    pub op_timeout: Duration,

    /// Failures tolerated per indexer within `retry_window`.
    pub max_retries: u32,

    pub retry_window: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// JSON document seeding the in-memory collaborators at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indexers: Vec::new(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            op_timeout: DEFAULT_OP_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_window: DEFAULT_RETRY_WINDOW,
            log_level: "info".to_string(),
            seed_file: None,
        }
    }
}

impl Config {
    /// Load configuration from `ALLOCSYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let indexers = match lookup("ALLOCSYNC_INDEXERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IndexerId>()
                        .with_context(|| format!("invalid indexer in ALLOCSYNC_INDEXERS: {s}"))
                })
                .collect::<Result<Vec<_>>>()?,
            None => defaults.indexers,
        };

        let reconcile_interval = secs(&lookup, "ALLOCSYNC_RECONCILE_INTERVAL_SECS")?
            .unwrap_or(defaults.reconcile_interval);

        let op_timeout =
            secs(&lookup, "ALLOCSYNC_OP_TIMEOUT_SECS")?.unwrap_or(defaults.op_timeout);

        let max_retries = match lookup("ALLOCSYNC_MAX_RETRIES") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("invalid ALLOCSYNC_MAX_RETRIES: {v}"))?,
            None => defaults.max_retries,
        };

        let retry_window =
            secs(&lookup, "ALLOCSYNC_RETRY_WINDOW_SECS")?.unwrap_or(defaults.retry_window);

        let log_level = lookup("ALLOCSYNC_LOG_LEVEL").unwrap_or(defaults.log_level);

        let seed_file = lookup("ALLOCSYNC_SEED_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        if reconcile_interval.is_zero() {
            anyhow::bail!("ALLOCSYNC_RECONCILE_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            indexers,
            reconcile_interval,
            op_timeout,
            max_retries,
            retry_window,
            log_level,
            seed_file,
        })
    }
}

fn secs<F>(lookup: &F, name: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("invalid {name}: {v}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.indexers.is_empty());
        assert_eq!(config.reconcile_interval, DEFAULT_RECONCILE_INTERVAL);
        assert_eq!(config.op_timeout, DEFAULT_OP_TIMEOUT);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.log_level, "info");
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (
                "ALLOCSYNC_INDEXERS",
                "0x6125ea331851367716bee301ecde7f38a7e429e7, 0x0000000000000000000000000000000000000001",
            ),
            ("ALLOCSYNC_RECONCILE_INTERVAL_SECS", "5"),
            ("ALLOCSYNC_OP_TIMEOUT_SECS", "2"),
            ("ALLOCSYNC_MAX_RETRIES", "7"),
            ("ALLOCSYNC_LOG_LEVEL", "debug"),
            ("ALLOCSYNC_SEED_FILE", "/etc/allocsync/seed.json"),
        ]))
        .unwrap();

        assert_eq!(config.indexers.len(), 2);
        assert_eq!(
            config.indexers[0].to_string(),
            "0x6125ea331851367716bee301ecde7f38a7e429e7"
        );
        assert_eq!(config.reconcile_interval, Duration::from_secs(5));
        assert_eq!(config.op_timeout, Duration::from_secs(2));
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.seed_file.as_deref(),
            Some(std::path::Path::new("/etc/allocsync/seed.json"))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("ALLOCSYNC_OP_TIMEOUT_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ALLOCSYNC_INDEXERS", "0x1234")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[("ALLOCSYNC_RECONCILE_INTERVAL_SECS", "0")])).is_err()
        );
    }
}
