//! Racing an operation against a timer.
//!
//! The raced operation runs as its own tokio task. When the timer wins, the
//! caller gets [`RaceError::TimedOut`] and moves on, but the task is **not**
//! cancelled: it keeps running and may still finish, including any writes it
//! performs, after the caller has given up. There is no cancellation channel.
//! An operation that must stop early has to check for that itself at its own
//! suspension points.

use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::keyed::KeyedMutex;

/// Why a raced operation produced no value.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RaceError {
    /// The timer fired first. The operation is still running.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// The runtime dropped the operation's task before it finished.
    #[error("operation task was cancelled")]
    Cancelled,
}

/// Outcome of [`KeyedMutex::run_exclusive_with_timeout`] other than success.
#[derive(Debug, Error)]
pub enum ExclusiveError<E> {
    /// No result within the deadline, counting time spent queued for the key.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation task was cancelled")]
    Cancelled,

    /// The operation's own error, unchanged.
    #[error(transparent)]
    Operation(E),
}

impl<E> ExclusiveError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns the operation's own error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<RaceError> for ExclusiveError<E> {
    fn from(err: RaceError) -> Self {
        match err {
            RaceError::TimedOut(after) => Self::Timeout(after),
            RaceError::Cancelled => Self::Cancelled,
        }
    }
}

/// Run `fut` on its own task and wait at most `after` for its output.
///
/// A panic inside `fut` is resumed on the caller.
pub async fn race_timeout<Fut>(after: Duration, fut: Fut) -> Result<Fut::Output, RaceError>
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let mut task = tokio::spawn(fut);

    tokio::select! {
        joined = &mut task => match joined {
            Ok(output) => Ok(output),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(RaceError::Cancelled),
        },
        _ = tokio::time::sleep(after) => {
            // Dropping the JoinHandle detaches the task; it is not aborted.
            warn!(
                timeout_ms = after.as_millis() as u64,
                "Operation timed out, leaving it running in the background"
            );
            Err(RaceError::TimedOut(after))
        }
    }
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// [`KeyedMutex::run_exclusive`] raced against a timer.
    ///
    /// On timeout the call keeps its place in the key's queue and still runs
    /// (or keeps running) in the background; later callers for the key wait
    /// for it as usual.
    pub async fn run_exclusive_with_timeout<F, Fut, T, E>(
        &self,
        key: K,
        after: Duration,
        op: F,
    ) -> Result<T, ExclusiveError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mutex = self.clone();
        race_timeout(after, async move { mutex.run_exclusive(key, op).await })
            .await?
            .map_err(ExclusiveError::Operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_operation_wins() {
        let result = race_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_timed_out_operation_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));

        let result = race_timeout(Duration::from_millis(10), {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.store(true, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(result, Err(RaceError::TimedOut(Duration::from_millis(10))));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    #[should_panic(expected = "op exploded")]
    async fn test_panic_is_resumed() {
        let _ = race_timeout(Duration::from_secs(1), async {
            panic!("op exploded");
        })
        .await;
    }

    #[tokio::test]
    async fn test_exclusive_operation_error_is_verbatim() {
        let mutex = KeyedMutex::new();
        let result: Result<(), _> = mutex
            .run_exclusive_with_timeout("k", Duration::from_secs(1), || async {
                Err::<(), _>("store unavailable")
            })
            .await;

        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.into_operation(), Some("store unavailable"));
    }

    #[tokio::test]
    async fn test_exclusive_timeout_counts_queue_time() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock("k").await;

        let result = mutex
            .run_exclusive_with_timeout("k", Duration::from_millis(10), || async {
                Ok::<_, String>(1)
            })
            .await;
        assert!(matches!(result, Err(ExclusiveError::Timeout(_))));

        // The abandoned call is still queued behind the guard and runs once
        // the key frees up.
        assert_eq!(mutex.holders(&"k"), 2);
        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mutex.is_empty());
    }
}
