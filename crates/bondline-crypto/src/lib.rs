//! # bondline-crypto
//!
//! Hashing and Merkle primitives for snapshot claims.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 leaf and inner-node hashing
//! - [`merkle`]: Canonical (sorted-pair) Merkle tree construction and proof verification

pub mod blake3;
pub mod merkle;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// A Merkle tree needs at least one leaf.
    #[error("cannot build a Merkle tree without leaves")]
    EmptyTree,

    /// Requested leaf index is outside the tree.
    #[error("leaf index {index} out of range for {leaves} leaves")]
    LeafIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of leaves in the tree.
        leaves: usize,
    },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
