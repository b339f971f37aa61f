//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Scheduling state for one key.
struct Slot {
    /// Fair (FIFO) async lock; the running operation holds it.
    lock: Arc<Mutex<()>>,
    /// Running plus queued callers. The slot is removed when this hits zero.
    holders: usize,
}

type Slots<K> = Arc<StdMutex<HashMap<K, Slot>>>;

/// Serializes operations that share a key.
///
/// Calls under the same key run one at a time in arrival order; a call that
/// fails (or panics) releases the key like any other, so later callers are
/// never blocked or poisoned by it. Calls under different keys run
/// concurrently.
///
/// Cloning is cheap and clones share the same registry.
pub struct KeyedMutex<K> {
    slots: Slots<K>,
}

impl<K> Clone for KeyedMutex<K> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K> std::fmt::Debug for KeyedMutex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedMutex")
            .field("keys", &lock_slots(&self.slots).len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` once every earlier call for `key` has settled.
    ///
    /// Whatever `op` returns, including an `Err`, goes to this caller only.
    pub async fn run_exclusive<F, Fut, T>(&self, key: K, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        op().await
    }

    /// Wait for exclusive access to `key`. Access ends when the guard drops.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let ticket = self.register(key);
        trace!(holders = ticket.holders(), "Waiting for keyed lock");
        let guard = Arc::clone(&ticket.lock).lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Returns true if `key` has a running or queued caller.
    pub fn contains(&self, key: &K) -> bool {
        lock_slots(&self.slots).contains_key(key)
    }

    /// Running plus queued callers for `key`.
    pub fn holders(&self, key: &K) -> usize {
        lock_slots(&self.slots)
            .get(key)
            .map_or(0, |slot| slot.holders)
    }

    /// Number of keys with a running or queued caller.
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join the queue for `key`. Runs without suspending, so "am I first" and
    /// "register as next" can't interleave with another caller.
    fn register(&self, key: K) -> Ticket<K> {
        let mut slots = lock_slots(&self.slots);
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
            lock: Arc::new(Mutex::new(())),
            holders: 0,
        });
        slot.holders += 1;
        Ticket {
            slots: Arc::clone(&self.slots),
            lock: Arc::clone(&slot.lock),
            key,
        }
    }
}

/// Exclusive access to one key of a [`KeyedMutex`].
pub struct KeyedGuard<K: Eq + Hash> {
    // Field order matters: the lock is released before the ticket
    // deregisters.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<K>,
}

impl<K: Eq + Hash> std::fmt::Debug for KeyedGuard<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedGuard").finish_non_exhaustive()
    }
}

/// A caller's place in a key's queue. Dropping it (after running, or when a
/// waiting caller is cancelled) deregisters the caller.
struct Ticket<K: Eq + Hash> {
    slots: Slots<K>,
    lock: Arc<Mutex<()>>,
    key: K,
}

impl<K: Eq + Hash> Ticket<K> {
    fn holders(&self) -> usize {
        lock_slots(&self.slots)
            .get(&self.key)
            .map_or(0, |slot| slot.holders)
    }
}

impl<K: Eq + Hash> Drop for Ticket<K> {
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.holders -= 1;
            if slot.holders == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// The registry lock is never held across an await or user code, so a
/// poisoned lock still guards consistent data.
fn lock_slots<K>(slots: &StdMutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
