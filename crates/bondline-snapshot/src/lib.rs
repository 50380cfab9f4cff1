//! # bondline-snapshot
//!
//! Merkle snapshot claims.
//!
//! A governor publishes the root of a Merkle tree whose leaves attest each
//! delegator's pending stake and fees as of a snapshot round. A delegator
//! then adopts those balances as its checkpoint by presenting its leaf and
//! proof, and can chain an unbond or fee withdrawal in the same step.
//!
//! ## Modules
//!
//! - [`registry`]: Published snapshot roots
//! - [`leaf`]: Leaf encoding and tree construction
//! - [`gateway`]: Snapshot claim verification and follow-up execution

pub mod gateway;
pub mod leaf;
pub mod registry;

use bondline_types::{Address, Round};

/// Error types for snapshot operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error(transparent)]
    Bonding(#[from] bondline_bonding::BondingError),

    #[error(transparent)]
    Crypto(#[from] bondline_crypto::CryptoError),

    #[error("unknown snapshot {0}")]
    UnknownSnapshot(String),

    #[error("snapshot root {0} is already published")]
    RootAlreadyPublished(String),

    /// Snapshot round is at or after the regime boundary and the engine
    /// forbids such claims.
    #[error("snapshot round {snapshot_round} is not before the regime boundary {boundary}")]
    SnapshotAfterCutover { snapshot_round: Round, boundary: Round },

    #[error("invalid Merkle proof")]
    InvalidProof,

    #[error("duplicate snapshot entry for {0}")]
    DuplicateEntry(Address),
}

/// Convenience result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
