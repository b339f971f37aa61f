//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID is missing the `0x` prefix.
    #[error("ID missing '0x' prefix: got '{actual}'")]
    MissingPrefix { actual: String },

    /// The hex body has the wrong number of digits.
    #[error("invalid ID length: expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The hex body contains a non-hex character.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if the input had the right shape but the wrong size.
    pub fn is_length_error(&self) -> bool {
        matches!(self, IdError::InvalidLength { .. })
    }
}
