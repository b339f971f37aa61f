//! Keyed serialization primitives.
//!
//! - [`KeyedMutex`]: at most one in-flight operation per key, FIFO per key,
//!   no ordering across keys.
//! - [`race_timeout`]: races an operation against a timer without cancelling it.
//!
//! Both are in-process guarantees only. Two coordinator processes sharing a
//! database are not serialized against each other.

mod keyed;
mod timeout;

pub use keyed::{KeyedGuard, KeyedMutex};
pub use timeout::{race_timeout, ExclusiveError, RaceError};
