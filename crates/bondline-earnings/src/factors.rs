//! Sparse round-indexed factor storage.
//!
//! Rounds without an entry resolve to the nearest earlier round that has one.
//! Only non-zero factors are stored, so "zero" and "absent" are the same.

use std::collections::BTreeMap;

use bondline_types::{Amount, Round};
use serde::{Deserialize, Serialize};

/// Ordered map of round → factor with O(log n) nearest-prior lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorIndex {
    entries: BTreeMap<Round, Amount>,
}

impl FactorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the factor for `round`. Zero values are not stored.
    pub fn insert(&mut self, round: Round, factor: Amount) {
        if factor == 0 {
            return;
        }
        self.entries.insert(round, factor);
    }

    /// The factor stored exactly at `round`.
    pub fn get(&self, round: Round) -> Option<Amount> {
        self.entries.get(&round).copied()
    }

    /// The latest factor at or before `round`.
    pub fn latest_at(&self, round: Round) -> Option<Amount> {
        self.entries.range(..=round).next_back().map(|(_, f)| *f)
    }

    /// The latest factor strictly before `round`.
    pub fn latest_before(&self, round: Round) -> Option<Amount> {
        self.entries.range(..round).next_back().map(|(_, f)| *f)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reward and fee factors resolved for one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CumulativeFactors {
    pub reward: Amount,
    pub fee: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_prior_lookup() {
        let mut index = FactorIndex::new();
        index.insert(4, 100);
        index.insert(7, 150);

        assert_eq!(index.latest_at(3), None);
        assert_eq!(index.latest_at(4), Some(100));
        assert_eq!(index.latest_at(6), Some(100));
        assert_eq!(index.latest_at(9), Some(150));
        assert_eq!(index.latest_before(7), Some(100));
        assert_eq!(index.latest_before(4), None);
    }

    #[test]
    fn test_zero_not_stored() {
        let mut index = FactorIndex::new();
        index.insert(2, 0);
        assert!(index.is_empty());
        assert_eq!(index.get(2), None);
    }
}
