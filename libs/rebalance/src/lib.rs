//! Allocation rebalancing.
//!
//! When an indexer's on-chain used stake drifts from the sum of its locally
//! tracked allocations, the difference has to be spread back over those
//! allocations. This crate does that split with integer arithmetic only:
//!
//! - **Exact**: the per-allocation deltas always sum to the requested delta.
//! - **Bounded**: a reduction never takes more from an allocation than it holds.
//! - **Deterministic**: ties are broken by id, so reruns and audit replays agree.
//!
//! ```ignore
//! let result = rebalance(&allocations, SignedAmount::from(-500i128))?;
//! let updated = result.apply(&allocations)?;
//! ```

mod allocation;
mod amount;
mod error;
mod rebalance;

pub use allocation::{Allocation, AllocationSet, RebalanceRequest, RebalanceResult};
pub use amount::{Amount, SignedAmount};
pub use error::{InvalidRebalanceInput, RebalanceError};
pub use rebalance::{rebalance, rebalance_request, GUARD_DIGITS};

/// Re-exported so callers can build amounts from raw chain values.
pub use primitive_types::U256;
