//! Rebalancing errors.

use thiserror::Error;

use crate::amount::Amount;

/// Bad input to [`crate::rebalance`]. Always fatal to the call; never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidRebalanceInput {
    /// The allocation set has no members.
    #[error("allocation set is empty")]
    EmptySet,

    /// The same allocation id appears more than once.
    #[error("duplicate allocation id: {0}")]
    DuplicateId(String),

    /// An amount was given as a negative number.
    #[error("negative amount: {0}")]
    NegativeAmount(String),

    /// An amount could not be parsed as a decimal integer.
    #[error("malformed amount: {0}")]
    MalformedAmount(String),

    /// A reduction larger than everything currently allocated.
    #[error("reduction of {requested} exceeds allocated total {total}")]
    ReductionExceedsTotal { requested: Amount, total: Amount },

    /// Amounts too large for the scaled intermediates.
    #[error("arithmetic overflow: {0}")]
    Overflow(&'static str),
}

/// Errors returned by the rebalancer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RebalanceError {
    /// The request violated a precondition.
    #[error("invalid rebalance input: {0}")]
    InvalidInput(#[from] InvalidRebalanceInput),

    /// A postcondition failed. This is a defect in the algorithm, not bad input.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl RebalanceError {
    /// Returns true if the caller supplied bad input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}
