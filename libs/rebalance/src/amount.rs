//! Integer amounts in minor units.
//!
//! Stake is denominated in the token's smallest unit (18 decimals for GRT), so
//! realistic totals run well past 64 bits. Everything here is 256-bit unsigned
//! integer arithmetic; there is no floating point anywhere in this crate.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidRebalanceInput;

/// A non-negative amount in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(U256);

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self(U256::zero());

    /// Wraps a raw 256-bit value.
    #[must_use]
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Returns the raw 256-bit value.
    #[must_use]
    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Applies a signed change, returning `None` if the result would be
    /// negative or overflow.
    pub fn checked_apply(self, delta: SignedAmount) -> Option<Self> {
        if delta.is_negative() {
            self.checked_sub(delta.magnitude())
        } else {
            self.checked_add(delta.magnitude())
        }
    }

    /// Number of decimal digits in the integer part. Zero has one digit.
    pub fn digits(&self) -> u32 {
        // to_string is decimal for U256; at most 78 characters.
        self.0.to_string().len() as u32
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = InvalidRebalanceInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(InvalidRebalanceInput::NegativeAmount(s.to_string()));
        }
        let digits = s.strip_prefix('+').unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidRebalanceInput::MalformedAmount(s.to_string()));
        }
        U256::from_dec_str(digits)
            .map(Self)
            .map_err(|_| InvalidRebalanceInput::MalformedAmount(s.to_string()))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A signed amount in minor units: a sign plus a 256-bit magnitude.
///
/// Zero is never negative, so derived equality and hashing are sound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SignedAmount {
    negative: bool,
    magnitude: U256,
}

impl SignedAmount {
    pub const ZERO: Self = Self {
        negative: false,
        magnitude: U256::zero(),
    };

    /// A non-negative signed amount.
    #[must_use]
    pub fn positive(amount: Amount) -> Self {
        Self {
            negative: false,
            magnitude: amount.0,
        }
    }

    /// A non-positive signed amount (`-amount`).
    #[must_use]
    pub fn negative(amount: Amount) -> Self {
        Self {
            negative: !amount.is_zero(),
            magnitude: amount.0,
        }
    }

    /// `minuend - subtrahend`, which is signed even though both sides are not.
    #[must_use]
    pub fn difference(minuend: Amount, subtrahend: Amount) -> Self {
        match minuend.cmp(&subtrahend) {
            Ordering::Less => Self::negative(Amount(subtrahend.0 - minuend.0)),
            _ => Self::positive(Amount(minuend.0 - subtrahend.0)),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    /// Absolute value.
    pub fn magnitude(&self) -> Amount {
        Amount(self.magnitude)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.negative == other.negative {
            let magnitude = self.magnitude.checked_add(other.magnitude)?;
            return Some(Self {
                negative: self.negative && !magnitude.is_zero(),
                magnitude,
            });
        }
        // Opposite signs: the larger magnitude wins the sign.
        let (pos, neg) = if self.negative {
            (other.magnitude, self.magnitude)
        } else {
            (self.magnitude, other.magnitude)
        };
        Some(Self::difference(Amount(pos), Amount(neg)))
    }

    /// Sums an iterator, returning `None` on overflow.
    pub fn checked_sum<I>(iter: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter()
            .try_fold(Self::ZERO, |acc, value| acc.checked_add(value))
    }
}

impl Neg for SignedAmount {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            negative: !self.negative && !self.magnitude.is_zero(),
            magnitude: self.magnitude,
        }
    }
}

impl From<Amount> for SignedAmount {
    fn from(amount: Amount) -> Self {
        Self::positive(amount)
    }
}

impl From<i128> for SignedAmount {
    fn from(value: i128) -> Self {
        let magnitude = Amount::from(value.unsigned_abs());
        if value < 0 {
            Self::negative(magnitude)
        } else {
            Self::positive(magnitude)
        }
    }
}

impl Ord for SignedAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl PartialOrd for SignedAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

impl FromStr for SignedAmount {
    type Err = InvalidRebalanceInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix('-') {
            Some(rest) if !rest.starts_with(['-', '+']) => {
                let magnitude: Amount = rest
                    .parse()
                    .map_err(|_| InvalidRebalanceInput::MalformedAmount(s.to_string()))?;
                Ok(Self::negative(magnitude))
            }
            Some(_) => Err(InvalidRebalanceInput::MalformedAmount(s.to_string())),
            None => s.parse().map(Self::positive),
        }
    }
}

impl Serialize for SignedAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SignedAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
