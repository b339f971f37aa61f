//! Allocation records and the request/result shapes of a rebalance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, SignedAmount};
use crate::error::{InvalidRebalanceInput, RebalanceError};

/// Stake attributed to one deployment under one indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation<I> {
    pub id: I,
    pub amount: Amount,
}

impl<I> Allocation<I> {
    pub fn new(id: I, amount: impl Into<Amount>) -> Self {
        Self {
            id,
            amount: amount.into(),
        }
    }
}

/// An indexer's allocations at one point in time.
///
/// Order is preserved as given. The set is replaced as a whole, never edited
/// in place; [`RebalanceResult::apply`] returns a fresh set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationSet<I>(Vec<Allocation<I>>);

impl<I> AllocationSet<I> {
    pub fn new(allocations: Vec<Allocation<I>>) -> Self {
        Self(allocations)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Allocation<I>> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Allocation<I>] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Allocation<I>> {
        self.0
    }

    /// Sum of all amounts.
    pub fn total(&self) -> Result<Amount, InvalidRebalanceInput> {
        self.0.iter().try_fold(Amount::ZERO, |acc, allocation| {
            acc.checked_add(allocation.amount)
                .ok_or(InvalidRebalanceInput::Overflow("allocation total"))
        })
    }
}

impl<I> Default for AllocationSet<I> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<I> FromIterator<Allocation<I>> for AllocationSet<I> {
    fn from_iter<T: IntoIterator<Item = Allocation<I>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<I> IntoIterator for AllocationSet<I> {
    type Item = Allocation<I>;
    type IntoIter = std::vec::IntoIter<Allocation<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, I> IntoIterator for &'a AllocationSet<I> {
    type Item = &'a Allocation<I>;
    type IntoIter = std::slice::Iter<'a, Allocation<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A set plus the aggregate change to distribute over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceRequest<I> {
    pub allocations: AllocationSet<I>,
    /// Negative for a reduction.
    pub delta: SignedAmount,
}

/// Per-allocation deltas. Sums to exactly the requested delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "I: Ord + Serialize",
    deserialize = "I: Ord + Deserialize<'de>"
))]
pub struct RebalanceResult<I> {
    deltas: BTreeMap<I, SignedAmount>,
}

impl<I: Ord> RebalanceResult<I> {
    pub(crate) fn from_deltas(deltas: BTreeMap<I, SignedAmount>) -> Self {
        Self { deltas }
    }

    /// Delta for one allocation.
    pub fn get(&self, id: &I) -> Option<SignedAmount> {
        self.deltas.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Iterates `(id, delta)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&I, SignedAmount)> {
        self.deltas.iter().map(|(id, delta)| (id, *delta))
    }

    /// Sum of all deltas.
    pub fn total(&self) -> Option<SignedAmount> {
        SignedAmount::checked_sum(self.deltas.values().copied())
    }

    /// Number of allocations whose amount actually changes.
    pub fn changed(&self) -> usize {
        self.deltas.values().filter(|delta| !delta.is_zero()).count()
    }
}

impl<I: Ord + Clone> RebalanceResult<I> {
    /// Produces the new allocation set, preserving the input order.
    ///
    /// Ids missing from the result are left unchanged.
    pub fn apply(&self, allocations: &AllocationSet<I>) -> Result<AllocationSet<I>, RebalanceError>
    where
        I: std::fmt::Debug,
    {
        allocations
            .iter()
            .map(|allocation| {
                let delta = self.get(&allocation.id).unwrap_or_default();
                let amount = allocation.amount.checked_apply(delta).ok_or_else(|| {
                    RebalanceError::InternalInvariantViolation(format!(
                        "delta {delta} drives allocation {:?} ({}) out of range",
                        allocation.id, allocation.amount
                    ))
                })?;
                Ok(Allocation {
                    id: allocation.id.clone(),
                    amount,
                })
            })
            .collect()
    }
}
