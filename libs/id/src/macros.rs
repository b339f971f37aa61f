//! Macros for defining typed hex ID types.

/// Macro to define a typed, fixed-width hex ID.
///
/// This generates a newtype wrapper around `[u8; N]` with:
/// - A `BYTES` constant and `HEX_LEN` constant
/// - `from_bytes()` / `as_bytes()`
/// - `parse()` accepting `0x`-prefixed hex of either case
/// - `Display` (lowercase, `0x`-prefixed) and `FromStr` implementations
/// - `Serialize` and `Deserialize` through the text form
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_hex_id!(IndexerId, 20);
///
/// let parsed: IndexerId = "0x6125ea331851367716bee301ecde7f38a7e429e7".parse()?;
/// ```
#[macro_export]
macro_rules! define_hex_id {
    ($name:ident, $bytes:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $bytes]);

        impl $name {
            /// Width of the identifier in bytes.
            pub const BYTES: usize = $bytes;

            /// Number of hex digits in the canonical form (excluding `0x`).
            pub const HEX_LEN: usize = $bytes * 2;

            /// Creates an ID from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $bytes]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $bytes] {
                &self.0
            }

            /// Parses an ID from a string.
            ///
            /// The string must be `0x` followed by exactly `HEX_LEN` hex digits.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some(body) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
                    return Err($crate::IdError::MissingPrefix {
                        actual: s.to_string(),
                    });
                };

                if body.len() != Self::HEX_LEN {
                    return Err($crate::IdError::InvalidLength {
                        expected: Self::HEX_LEN,
                        actual: body.len(),
                    });
                }

                let mut bytes = [0u8; $bytes];
                $crate::__private::hex::decode_to_slice(body, &mut bytes)
                    .map_err(|e| $crate::IdError::InvalidHex(e.to_string()))?;

                Ok(Self(bytes))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "0x{}", $crate::__private::hex::encode(self.0))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<[u8; $bytes]> for $name {
            fn from(bytes: [u8; $bytes]) -> Self {
                Self(bytes)
            }
        }

        impl $crate::__private::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: $crate::__private::serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> $crate::__private::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: $crate::__private::serde::Deserializer<'de>,
            {
                let s = <String as $crate::__private::serde::Deserialize>::deserialize(deserializer)?;
                Self::parse(&s).map_err($crate::__private::serde::de::Error::custom)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}
