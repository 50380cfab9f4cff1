//! Canonical Merkle tree over snapshot leaves.
//!
//! Sibling pairs are hashed in sorted order, so a proof is a flat list of
//! sibling hashes with no left/right flags. An odd node at the end of a level
//! is promoted to the next level unchanged.

use bondline_types::Hash;

use crate::blake3;
use crate::{CryptoError, Result};

/// Hash two sibling nodes in canonical (sorted) order.
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    if a <= b {
        blake3::merkle_inner(a, b)
    } else {
        blake3::merkle_inner(b, a)
    }
}

/// A fully materialized Merkle tree. `levels[0]` holds the leaves.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree from already-hashed leaves.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::EmptyTree`] if `leaves` is empty
    pub fn from_leaves(leaves: Vec<Hash>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(CryptoError::EmptyTree);
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last() {
            if current.len() <= 1 {
                break;
            }
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => hash_pair(&pair[0], right),
                    None => pair[0],
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The Merkle root.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leaf hash at `index`.
    pub fn leaf(&self, index: usize) -> Option<&Hash> {
        self.levels.first().and_then(|leaves| leaves.get(index))
    }

    /// Sibling hashes from the leaf at `index` up to the root.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::LeafIndexOutOfRange`] if `index` is not a leaf
    pub fn proof(&self, index: usize) -> Result<Vec<Hash>> {
        let leaves = self.len();
        if index >= leaves {
            return Err(CryptoError::LeafIndexOutOfRange { index, leaves });
        }

        let mut siblings = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            // Promoted odd nodes have no sibling at this level.
            if let Some(hash) = level.get(sibling) {
                siblings.push(*hash);
            }
            position /= 2;
        }
        Ok(siblings)
    }
}

/// Fold a proof over a leaf and return the implied root.
pub fn process_proof(leaf: &Hash, proof: &[Hash]) -> Hash {
    proof
        .iter()
        .fold(*leaf, |current, sibling| hash_pair(&current, sibling))
}

/// Verify that `leaf` is included under `root`.
pub fn verify_proof(root: &Hash, leaf: &Hash, proof: &[Hash]) -> bool {
    process_proof(leaf, proof) == *root
}
