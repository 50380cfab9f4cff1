//! Engine configuration.

use bondline_types::{Address, Round};
use serde::{Deserialize, Serialize};

/// How snapshot claims whose snapshot round is at or after the regime
/// boundary are treated.
///
/// A snapshot leaf already contains growth through the snapshot round. If
/// the checkpoint it creates is later projected from the boundary's base
/// factor, the rounds between the boundary and the snapshot are counted twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotCutoverPolicy {
    /// Project snapshot checkpoints from the boundary base. Reproduces the
    /// double count, kept for reconciliation against historic balances.
    Reference,
    /// Project snapshot checkpoints from the snapshot round's own factors.
    ExcludeCoveredRounds,
    /// Reject snapshot claims at or after the boundary.
    #[default]
    ForbidPostCutover,
}

/// Configuration of a [`crate::BondingManager`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondingConfig {
    /// Account allowed to set the regime boundary and publish snapshot roots.
    pub governor: Address,
    /// Upper bound on legacy rounds walked by a single claim.
    #[serde(default = "default_max_legacy_rounds")]
    pub max_legacy_rounds_per_claim: u64,
    /// Rounds an unbonding lock waits before it can be withdrawn.
    #[serde(default = "default_unbonding_period")]
    pub unbonding_period: Round,
    #[serde(default)]
    pub snapshot_cutover_policy: SnapshotCutoverPolicy,
}

fn default_max_legacy_rounds() -> u64 {
    100
}

fn default_unbonding_period() -> Round {
    7
}

impl Default for BondingConfig {
    fn default() -> Self {
        Self {
            governor: Address::ZERO,
            max_legacy_rounds_per_claim: default_max_legacy_rounds(),
            unbonding_period: default_unbonding_period(),
            snapshot_cutover_policy: SnapshotCutoverPolicy::default(),
        }
    }
}
