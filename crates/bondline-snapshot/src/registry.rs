//! Published snapshot roots. Each identifier is set once.

use std::collections::HashMap;

use bondline_types::{Hash, Round};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Result, SnapshotError};

/// A published root and the round its leaves were computed through.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRoot {
    #[serde_as(as = "serde_with::hex::Hex")]
    pub root: Hash,
    pub round: Round,
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotRegistry {
    roots: HashMap<String, SnapshotRoot>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `root` under `identifier`.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::RootAlreadyPublished`] if the identifier is taken
    pub fn publish(&mut self, identifier: &str, root: SnapshotRoot) -> Result<()> {
        if self.roots.contains_key(identifier) {
            return Err(SnapshotError::RootAlreadyPublished(identifier.to_string()));
        }
        self.roots.insert(identifier.to_string(), root);
        Ok(())
    }

    /// Root published under `identifier`.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::UnknownSnapshot`] if nothing was published under `identifier`
    pub fn get(&self, identifier: &str) -> Result<SnapshotRoot> {
        self.roots
            .get(identifier)
            .copied()
            .ok_or_else(|| SnapshotError::UnknownSnapshot(identifier.to_string()))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
