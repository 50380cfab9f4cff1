//! Snapshot leaf encoding and tree construction.
//!
//! ```text
//! leaf = BLAKE3(0x00 || address (20) || stake (u128 BE) || fees (u128 BE))
//! ```

use std::collections::HashMap;

use bondline_bonding::rounds::RoundsManager;
use bondline_bonding::BondingManager;
use bondline_crypto::blake3::merkle_leaf;
use bondline_crypto::merkle::MerkleTree;
use bondline_types::address::ADDRESS_LEN;
use bondline_types::{Address, Amount, Hash, Round};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Result, SnapshotError};

/// Encoded leaf length.
pub const LEAF_LEN: usize = ADDRESS_LEN + 16 + 16;

/// Fixed-width leaf preimage (without the domain prefix).
pub fn encode_leaf(delegator: &Address, stake: Amount, fees: Amount) -> [u8; LEAF_LEN] {
    let mut out = [0u8; LEAF_LEN];
    out[..ADDRESS_LEN].copy_from_slice(delegator.as_bytes());
    out[ADDRESS_LEN..ADDRESS_LEN + 16].copy_from_slice(&stake.to_be_bytes());
    out[ADDRESS_LEN + 16..].copy_from_slice(&fees.to_be_bytes());
    out
}

/// Domain-separated leaf hash.
pub fn snapshot_leaf(delegator: &Address, stake: Amount, fees: Amount) -> Hash {
    merkle_leaf(&encode_leaf(delegator, stake, fees))
}

/// One delegator's attested balances.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub delegator: Address,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub stake: Amount,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub fees: Amount,
}

impl SnapshotEntry {
    pub fn leaf(&self) -> Hash {
        snapshot_leaf(&self.delegator, self.stake, self.fees)
    }
}

/// A snapshot tree indexed by delegator.
#[derive(Clone, Debug)]
pub struct SnapshotTree {
    tree: MerkleTree,
    entries: Vec<SnapshotEntry>,
    index: HashMap<Address, usize>,
}

impl SnapshotTree {
    /// Build a tree over `entries`, one per delegator.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::DuplicateEntry`] if a delegator appears twice
    /// - [`bondline_crypto::CryptoError::EmptyTree`] if `entries` is empty
    pub fn build(entries: Vec<SnapshotEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if index.insert(entry.delegator, position).is_some() {
                return Err(SnapshotError::DuplicateEntry(entry.delegator));
            }
        }
        let tree = MerkleTree::from_leaves(entries.iter().map(SnapshotEntry::leaf).collect())?;
        Ok(Self {
            tree,
            entries,
            index,
        })
    }

    pub fn root(&self) -> Hash {
        self.tree.root()
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn entry(&self, delegator: &Address) -> Option<&SnapshotEntry> {
        self.index.get(delegator).and_then(|i| self.entries.get(*i))
    }

    /// Inclusion proof for `delegator`'s leaf.
    pub fn proof(&self, delegator: &Address) -> Result<Option<Vec<Hash>>> {
        match self.index.get(delegator) {
            Some(position) => Ok(Some(self.tree.proof(*position)?)),
            None => Ok(None),
        }
    }
}

/// Pending balances at `round` of every delegator checkpointed before it.
pub fn collect_entries<R: RoundsManager>(
    manager: &BondingManager<R>,
    round: Round,
) -> Result<Vec<SnapshotEntry>> {
    let mut entries = Vec::new();
    for (address, delegator) in manager.delegators() {
        if delegator.last_claim_round >= round {
            continue;
        }
        entries.push(SnapshotEntry {
            delegator: *address,
            stake: manager.pending_stake(*address, round)?,
            fees: manager.pending_fees(*address, round)?,
        });
    }
    tracing::debug!(round, entries = entries.len(), "collected snapshot entries");
    Ok(entries)
}
