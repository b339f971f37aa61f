//! Per-indexer failure accounting.
//!
//! Only transient failures (collaborator errors, timeouts) count against an
//! indexer. A rebalance that is rejected as invalid input, or that trips an
//! invariant, fails the same way on every attempt; it is surfaced to the
//! caller each time and never turns into `RetriesExhausted`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use allocsync_id::IndexerId;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Default retry limit per indexer within one window.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retry window.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60); // 10 minutes

/// Transient failures seen for one indexer in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub count: u32,
    pub window_start: Instant,
    /// Rendered form of the most recent failure.
    pub last_error: String,
}

/// Tracks transient reconciliation failures per indexer.
///
/// Once an indexer fails transiently more than `max_retries` times inside
/// `window`, it is reported as exhausted until the window lapses or a
/// successful reconcile clears it.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u32,
    window: Duration,
    failures: BTreeMap<IndexerId, FailureRecord>,
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WINDOW)
    }
}

impl RetryTracker {
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Account for the result of one reconcile.
    ///
    /// Success clears the indexer, a transient error counts against it, and
    /// a permanent error leaves the record untouched. Returns true if this
    /// result exhausted the indexer's retries.
    pub fn observe<T>(&mut self, indexer: IndexerId, result: &CoordinatorResult<T>) -> bool {
        self.observe_at(indexer, result, Instant::now())
    }

    fn observe_at<T>(
        &mut self,
        indexer: IndexerId,
        result: &CoordinatorResult<T>,
        now: Instant,
    ) -> bool {
        match result {
            Ok(_) => {
                self.clear(&indexer);
                false
            }
            Err(e) if e.is_transient() => self.record_transient(indexer, e, now),
            Err(_) => false,
        }
    }

    fn record_transient(
        &mut self,
        indexer: IndexerId,
        error: &CoordinatorError,
        now: Instant,
    ) -> bool {
        let record = self.failures.entry(indexer).or_insert_with(|| FailureRecord {
            count: 0,
            window_start: now,
            last_error: String::new(),
        });

        if now.duration_since(record.window_start) > self.window {
            record.count = 0;
            record.window_start = now;
        }

        record.count += 1;
        record.last_error = error.to_string();
        record.count > self.max_retries
    }

    /// Check if retries are exhausted for an indexer.
    pub fn is_exhausted(&self, indexer: &IndexerId) -> bool {
        self.is_exhausted_at(indexer, Instant::now())
    }

    fn is_exhausted_at(&self, indexer: &IndexerId, now: Instant) -> bool {
        self.failures.get(indexer).is_some_and(|record| {
            now.duration_since(record.window_start) <= self.window
                && record.count > self.max_retries
        })
    }

    /// The failures recorded for an indexer, if any.
    pub fn failures(&self, indexer: &IndexerId) -> Option<&FailureRecord> {
        self.failures.get(indexer)
    }

    pub fn clear(&mut self, indexer: &IndexerId) {
        self.failures.remove(indexer);
    }

    /// Drop entries whose window has lapsed.
    pub fn prune(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.failures
            .retain(|_, record| now.duration_since(record.window_start) <= window);
    }

    /// Number of indexers with recorded failures.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use allocsync_rebalance::{InvalidRebalanceInput, RebalanceError};

    fn indexer(byte: u8) -> IndexerId {
        IndexerId::from_bytes([byte; 20])
    }

    fn store_failure() -> CoordinatorResult<()> {
        Err(StoreError::Storage("connection reset".to_string()).into())
    }

    #[test]
    fn test_transient_failures_exhaust() {
        let mut tracker = RetryTracker::new(2, Duration::from_secs(60));

        assert!(!tracker.observe(indexer(1), &store_failure()));
        assert!(!tracker.observe(indexer(1), &store_failure()));
        let timed_out: CoordinatorResult<()> =
            Err(CoordinatorError::Timeout(Duration::from_secs(1)));
        assert!(tracker.observe(indexer(1), &timed_out));

        assert!(tracker.is_exhausted(&indexer(1)));
        assert!(!tracker.is_exhausted(&indexer(2)));
        let record = tracker.failures(&indexer(1)).unwrap();
        assert_eq!(record.count, 3);
        assert!(record.last_error.contains("timed out"));

        tracker.observe(indexer(1), &Ok(()));
        assert!(!tracker.is_exhausted(&indexer(1)));
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_permanent_failures_not_counted() {
        let mut tracker = RetryTracker::new(0, Duration::from_secs(60));
        let invalid: CoordinatorResult<()> = Err(InvalidRebalanceInput::EmptySet.into());
        let invariant: CoordinatorResult<()> = Err(RebalanceError::InternalInvariantViolation(
            "shares sum to 4, expected 5".to_string(),
        )
        .into());

        for _ in 0..5 {
            assert!(!tracker.observe(indexer(1), &invalid));
            assert!(!tracker.observe(indexer(1), &invariant));
        }

        assert!(!tracker.is_exhausted(&indexer(1)));
        assert!(tracker.failures(&indexer(1)).is_none());
    }

    #[test]
    fn test_permanent_failure_keeps_transient_count() {
        let mut tracker = RetryTracker::new(0, Duration::from_secs(60));
        let invalid: CoordinatorResult<()> = Err(InvalidRebalanceInput::EmptySet.into());

        assert!(tracker.observe(indexer(1), &store_failure()));
        tracker.observe(indexer(1), &invalid);

        assert!(tracker.is_exhausted(&indexer(1)));
        let record = tracker.failures(&indexer(1)).unwrap();
        assert!(record.last_error.contains("connection reset"));
    }

    #[test]
    fn test_window_resets_count() {
        let mut tracker = RetryTracker::new(1, Duration::from_secs(60));
        let start = Instant::now();
        let later = start + Duration::from_secs(120);

        assert!(!tracker.observe_at(indexer(1), &store_failure(), start));
        assert!(tracker.observe_at(indexer(1), &store_failure(), start + Duration::from_secs(1)));
        assert!(!tracker.is_exhausted_at(&indexer(1), later));
        // Outside the window the count starts over.
        assert!(!tracker.observe_at(indexer(1), &store_failure(), later));
        assert_eq!(tracker.failures(&indexer(1)).unwrap().count, 1);
    }

    #[test]
    fn test_prune_keeps_recent() {
        let mut tracker = RetryTracker::new(1, Duration::from_secs(60));
        tracker.observe(indexer(1), &store_failure());
        tracker.prune();
        assert_eq!(tracker.tracked(), 1);
    }
}
