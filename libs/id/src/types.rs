//! Typed ID definitions for on-chain entities.

use crate::define_hex_id;

// =============================================================================
// Accounts
// =============================================================================

define_hex_id!(IndexerId, 20);

// =============================================================================
// Deployments
// =============================================================================

// Subgraph deployment hash: the bytes32 behind a `Qm...` IPFS hash.
define_hex_id!(DeploymentId, 32);

// =============================================================================
// Tests
// =============================================================================
