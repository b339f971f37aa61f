//! # allocsync-id
//!
//! Typed identifiers for the on-chain entities the allocation coordinator
//! deals with.
//!
//! ## Design Principles
//!
//! - IDs are fixed-width byte strings taken from the chain, never generated here
//! - All IDs have a canonical text form (`0x` + lowercase hex) with strict parsing
//! - Parsing is case-insensitive; formatting is always lowercase
//! - IDs are typed so an indexer address can't be passed where a deployment is expected
//!
//! ## ID Format
//!
//! - `IndexerId`: `0x` + 40 hex digits (20-byte address)
//! - `DeploymentId`: `0x` + 64 hex digits (32-byte subgraph deployment hash)

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

#[doc(hidden)]
pub mod __private {
    pub use hex;
    pub use serde;
}
