//! Proportional distribution of an aggregate delta.
//!
//! The delta is split in two passes:
//!
//! 1. **Scaled first pass.** Each allocation's weight `w = amount * S / T` is
//!    taken at a fixed-point scale `S = 10^(digits(T) + GUARD_DIGITS)`, and its
//!    share is `floor(R * w / S)`. Both divisions truncate, so the first pass
//!    never over-assigns.
//! 2. **Remainder walk.** The shortfall `R - sum(shares)` is handed out one
//!    allocation at a time, largest amount first (ties by id ascending), each
//!    allocation taking as much as its remaining room allows.
//!
//! The result always sums to exactly `delta`, and on a reduction no share
//! exceeds the allocation it is taken from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use primitive_types::{U256, U512};
use tracing::{debug, error};

use crate::allocation::{AllocationSet, RebalanceRequest, RebalanceResult};
use crate::amount::{Amount, SignedAmount};
use crate::error::{InvalidRebalanceInput, RebalanceError};

/// Extra decimal digits of precision carried by the fixed-point scale.
pub const GUARD_DIGITS: u32 = 6;

/// Distributes `delta` across `allocations` in proportion to their amounts.
///
/// Deterministic: the output depends only on the multiset of
/// `(id, amount)` pairs and `delta`, not on the input order.
pub fn rebalance<I>(
    allocations: &AllocationSet<I>,
    delta: SignedAmount,
) -> Result<RebalanceResult<I>, RebalanceError>
where
    I: Ord + Clone + Debug,
{
    if allocations.is_empty() {
        return Err(InvalidRebalanceInput::EmptySet.into());
    }

    let mut seen = BTreeSet::new();
    for allocation in allocations {
        if !seen.insert(&allocation.id) {
            return Err(InvalidRebalanceInput::DuplicateId(format!("{:?}", allocation.id)).into());
        }
    }

    let total = allocations.total()?;
    let reduction = delta.is_negative();
    let requested = delta.magnitude();

    if reduction && requested > total {
        return Err(InvalidRebalanceInput::ReductionExceedsTotal { requested, total }.into());
    }

    if requested.is_zero() {
        let deltas = allocations
            .iter()
            .map(|allocation| (allocation.id.clone(), SignedAmount::ZERO))
            .collect();
        return Ok(RebalanceResult::from_deltas(deltas));
    }

    // Nothing to be proportional to: an increase over an all-zero set is
    // spread evenly.
    let weights: Vec<U256> = if total.is_zero() {
        vec![U256::one(); allocations.len()]
    } else {
        allocations.iter().map(|a| a.amount.as_u256()).collect()
    };
    let weight_total = if total.is_zero() {
        Amount::from(allocations.len() as u64)
    } else {
        total
    };

    let first_pass = proportional_shares(&weights, weight_total, requested)?;
    let assigned = first_pass
        .iter()
        .try_fold(U256::zero(), |acc, share| acc.checked_add(*share))
        .ok_or(InvalidRebalanceInput::Overflow("first-pass sum"))?;
    let remainder = requested.as_u256().checked_sub(assigned).ok_or_else(|| {
        invariant_violation(format!(
            "first pass assigned {assigned}, more than requested {requested}"
        ))
    })?;

    debug!(
        allocations = allocations.len(),
        total = %total,
        delta = %delta,
        remainder = %remainder,
        "Distributing delta"
    );

    // Walk order: largest amount first, then id ascending.
    let mut order: Vec<usize> = (0..allocations.len()).collect();
    let members = allocations.as_slice();
    order.sort_by(|&a, &b| {
        members[b]
            .amount
            .cmp(&members[a].amount)
            .then_with(|| members[a].id.cmp(&members[b].id))
    });

    let top_ups: BTreeMap<usize, U256> = order
        .iter()
        .scan(remainder, |remaining, &index| {
            if remaining.is_zero() {
                return None;
            }
            let room = if reduction {
                members[index].amount.as_u256() - first_pass[index]
            } else {
                *remaining
            };
            let take = room.min(*remaining);
            *remaining -= take;
            Some((index, take))
        })
        .filter(|(_, take)| !take.is_zero())
        .collect();

    let shares: Vec<U256> = first_pass
        .iter()
        .enumerate()
        .map(|(index, share)| *share + top_ups.get(&index).copied().unwrap_or_default())
        .collect();

    check_postconditions(allocations, &shares, requested, reduction)?;

    let deltas = members
        .iter()
        .zip(shares)
        .map(|(allocation, share)| {
            let share = Amount::new(share);
            let delta = if reduction {
                SignedAmount::negative(share)
            } else {
                SignedAmount::positive(share)
            };
            (allocation.id.clone(), delta)
        })
        .collect();

    Ok(RebalanceResult::from_deltas(deltas))
}

/// [`rebalance`] over a packaged request.
pub fn rebalance_request<I>(
    request: &RebalanceRequest<I>,
) -> Result<RebalanceResult<I>, RebalanceError>
where
    I: Ord + Clone + Debug,
{
    rebalance(&request.allocations, request.delta)
}

/// First-pass shares `floor(R * floor(w_i * S / T) / S)`.
fn proportional_shares(
    weights: &[U256],
    total: Amount,
    requested: Amount,
) -> Result<Vec<U256>, InvalidRebalanceInput> {
    let scale = U512::exp10((total.digits() + GUARD_DIGITS) as usize);
    let total = U512::from(total.as_u256());
    let requested = U512::from(requested.as_u256());

    weights
        .iter()
        .map(|weight| {
            let scaled_weight = U512::from(*weight)
                .checked_mul(scale)
                .ok_or(InvalidRebalanceInput::Overflow("scaled weight"))?
                / total;
            let share = requested
                .checked_mul(scaled_weight)
                .ok_or(InvalidRebalanceInput::Overflow("scaled share"))?
                / scale;
            // share <= requested, which came from a U256.
            U256::try_from(share).map_err(|_| InvalidRebalanceInput::Overflow("share"))
        })
        .collect()
}

fn check_postconditions<I: Debug>(
    allocations: &AllocationSet<I>,
    shares: &[U256],
    requested: Amount,
    reduction: bool,
) -> Result<(), RebalanceError> {
    let sum = shares
        .iter()
        .try_fold(U256::zero(), |acc, share| acc.checked_add(*share));
    if sum != Some(requested.as_u256()) {
        return Err(invariant_violation(format!(
            "shares sum to {sum:?}, expected {requested}"
        )));
    }

    if reduction {
        for (allocation, share) in allocations.iter().zip(shares) {
            if *share > allocation.amount.as_u256() {
                return Err(invariant_violation(format!(
                    "share {share} exceeds allocation {:?} amount {}",
                    allocation.id, allocation.amount
                )));
            }
        }
    }

    Ok(())
}

fn invariant_violation(message: String) -> RebalanceError {
    error!(%message, "Rebalance invariant violated");
    RebalanceError::InternalInvariantViolation(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::Allocation;
    use proptest::prelude::*;
    use rstest::rstest;

    fn set(amounts: &[u128]) -> AllocationSet<usize> {
        amounts
            .iter()
            .enumerate()
            .map(|(id, amount)| Allocation::new(id, *amount))
            .collect()
    }

    fn delta(value: i128) -> SignedAmount {
        SignedAmount::from(value)
    }

    fn deltas(result: &RebalanceResult<usize>) -> Vec<String> {
        result.iter().map(|(_, d)| d.to_string()).collect()
    }

    #[test]
    fn test_large_allocation_absorbs_small_reduction() {
        let allocations: AllocationSet<usize> = vec![
            Allocation::new(0, 1u64),
            Allocation::new(1, 2u64),
            Allocation::new(2, "22010000000000000000000".parse::<Amount>().unwrap()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            allocations.total().unwrap().to_string(),
            "22010000000000000000003"
        );

        let result = rebalance(&allocations, delta(-500)).unwrap();

        assert_eq!(result.total(), Some(delta(-500)));
        assert_eq!(deltas(&result), ["0", "0", "-500"]);
    }

    #[test]
    fn test_equal_allocations_tie_break_by_id() {
        let allocations: AllocationSet<&str> = ["c", "a", "b"]
            .into_iter()
            .map(|id| Allocation::new(id, 100u64))
            .collect();

        let result = rebalance(&allocations, delta(-1)).unwrap();

        assert_eq!(result.get(&"a"), Some(delta(-1)));
        assert_eq!(result.get(&"b"), Some(SignedAmount::ZERO));
        assert_eq!(result.get(&"c"), Some(SignedAmount::ZERO));
        assert_eq!(result.changed(), 1);
    }

    #[rstest]
    #[case(&[5, 10, 0], 0)]
    #[case(&[0], 0)]
    #[case(&[1, 1, 1], 0)]
    fn test_zero_delta(#[case] amounts: &[u128], #[case] requested: i128) {
        let result = rebalance(&set(amounts), delta(requested)).unwrap();
        assert!(result.iter().all(|(_, d)| d.is_zero()));
        assert_eq!(result.len(), amounts.len());
    }

    #[rstest]
    #[case(&[1, 1, 1])]
    #[case(&[7, 0, 13, 1])]
    #[case(&[1_000_000_000_000_000_000, 3, 999_999_999_999_999_999])]
    fn test_full_drain(#[case] amounts: &[u128]) {
        let total: u128 = amounts.iter().sum();
        let result = rebalance(&set(amounts), delta(-(total as i128))).unwrap();
        for (id, amount) in amounts.iter().enumerate() {
            assert_eq!(result.get(&id), Some(delta(-(*amount as i128))));
        }
    }

    #[rstest]
    #[case(&[1, 1, 1], -2, &["-1", "-1", "0"])]
    #[case(&[10, 20, 30], -6, &["0", "-1", "-5"])]
    #[case(&[10, 20, 30], 6, &["0", "1", "5"])]
    #[case(&[3, 3], 1, &["1", "0"])]
    #[case(&[0, 0, 0], 4, &["2", "1", "1"])]
    #[case(&[0, 5], 3, &["0", "3"])]
    fn test_distribution(
        #[case] amounts: &[u128],
        #[case] requested: i128,
        #[case] expected: &[&str],
    ) {
        let result = rebalance(&set(amounts), delta(requested)).unwrap();
        assert_eq!(deltas(&result), expected);
        assert_eq!(result.total(), Some(delta(requested)));
    }

    #[test]
    fn test_empty_set_rejected() {
        let err = rebalance(&set(&[]), delta(-1)).unwrap_err();
        assert_eq!(err, RebalanceError::from(InvalidRebalanceInput::EmptySet));
    }

    #[test]
    fn test_reduction_exceeding_total_rejected() {
        let err = rebalance(&set(&[2, 3]), delta(-6)).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(matches!(
            err,
            RebalanceError::InvalidInput(InvalidRebalanceInput::ReductionExceedsTotal { .. })
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let allocations: AllocationSet<&str> = vec![
            Allocation::new("dep", 1u64),
            Allocation::new("dep", 2u64),
        ]
        .into_iter()
        .collect();
        let err = rebalance(&allocations, delta(-1)).unwrap_err();
        assert!(matches!(
            err,
            RebalanceError::InvalidInput(InvalidRebalanceInput::DuplicateId(_))
        ));
    }

    #[rstest]
    #[case(&[U256::MAX], -1)]
    #[case(&[U256::MAX / 2, U256::MAX / 2], -1)]
    #[case(&[U256::MAX / 3, U256::one()], 7)]
    fn test_scaled_weight_overflow_rejected(#[case] amounts: &[U256], #[case] requested: i128) {
        let allocations: AllocationSet<usize> = amounts
            .iter()
            .enumerate()
            .map(|(id, amount)| Allocation::new(id, *amount))
            .collect();

        let err = rebalance(&allocations, delta(requested)).unwrap_err();

        assert_eq!(err, RebalanceError::from(InvalidRebalanceInput::Overflow("scaled weight")));
    }

    #[test]
    fn test_apply_produces_new_set() {
        let allocations = set(&[10, 20, 30]);
        let result = rebalance(&allocations, delta(-30)).unwrap();
        let updated = result.apply(&allocations).unwrap();
        let amounts: Vec<String> = updated.iter().map(|a| a.amount.to_string()).collect();
        assert_eq!(amounts, ["6", "11", "13"]);
        assert_eq!(allocations.total().unwrap(), Amount::from(60u64));
    }

    #[test]
    fn test_request_wrapper() {
        let request = RebalanceRequest {
            allocations: set(&[4, 4]),
            delta: delta(-4),
        };
        let result = rebalance_request(&request).unwrap();
        assert_eq!(deltas(&result), ["-2", "-2"]);
    }

    fn amounts_strategy() -> impl Strategy<Value = Vec<u128>> {
        prop::collection::vec(
            prop_oneof![
                0u128..10,
                0u128..1_000_000,
                0u128..=1_000_000_000_000_000_000_000_000_000,
            ],
            1..12,
        )
    }

    /// Picks `total * per_mille / 1000` so any reduction stays in range.
    fn scaled(total: Amount, per_mille: u64) -> Amount {
        Amount::new(total.as_u256() * U256::from(per_mille) / U256::from(1_000u64))
    }

    proptest! {
        #[test]
        fn prop_reduction_is_exact_and_bounded(
            amounts in amounts_strategy(),
            per_mille in 0u64..=1_000,
        ) {
            let allocations = set(&amounts);
            let requested = scaled(allocations.total().unwrap(), per_mille);
            let result = rebalance(&allocations, SignedAmount::negative(requested)).unwrap();

            prop_assert_eq!(result.total(), Some(SignedAmount::negative(requested)));
            for allocation in &allocations {
                let d = result.get(&allocation.id).unwrap();
                prop_assert!(d.is_negative() || d.is_zero());
                prop_assert!(d.magnitude() <= allocation.amount);
            }
        }

        #[test]
        fn prop_increase_is_exact(
            amounts in amounts_strategy(),
            requested in 0u128..=1_000_000_000_000_000_000_000_000_000,
        ) {
            let allocations = set(&amounts);
            let result = rebalance(&allocations, SignedAmount::from(Amount::from(requested))).unwrap();

            prop_assert_eq!(result.total(), Some(SignedAmount::from(Amount::from(requested))));
            prop_assert!(result.iter().all(|(_, d)| !d.is_negative()));
        }

        #[test]
        fn prop_order_independent(
            amounts in amounts_strategy(),
            per_mille in 0u64..=1_000,
            rotate in 0usize..12,
        ) {
            let allocations = set(&amounts);
            let requested = SignedAmount::negative(scaled(allocations.total().unwrap(), per_mille));

            let mut shuffled = allocations.clone().into_inner();
            let len = shuffled.len();
            shuffled.rotate_left(rotate % len);
            shuffled.reverse();
            let shuffled: AllocationSet<usize> = shuffled.into_iter().collect();

            let first = rebalance(&allocations, requested).unwrap();
            let again = rebalance(&allocations, requested).unwrap();
            let reordered = rebalance(&shuffled, requested).unwrap();
            prop_assert_eq!(&first, &again);
            prop_assert_eq!(&first, &reordered);
        }
    }
}
