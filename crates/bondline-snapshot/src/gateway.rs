//! Snapshot claim gateway.
//!
//! A snapshot claim replaces the delegator's checkpoint with the balances in
//! its leaf and then runs a follow-up instruction against the new state. The
//! follow-up is planned against the state the snapshot would produce before
//! anything is written, so a failing follow-up rejects the whole claim.

use bondline_bonding::bonding::{UnbondPlan, WithdrawFeesPlan};
use bondline_bonding::claims::{ClaimReceipt, SnapshotCheckpoint};
use bondline_bonding::rounds::RoundsManager;
use bondline_bonding::{BondingError, BondingManager, SnapshotCutoverPolicy};
use bondline_crypto::merkle::verify_proof;
use bondline_types::events::AccountingEvent;
use bondline_types::{Address, Amount, Hash, Round};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::leaf::snapshot_leaf;
use crate::registry::{SnapshotRegistry, SnapshotRoot};
use crate::{Result, SnapshotError};

/// What to do right after the snapshot checkpoint is accepted.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FollowupInstruction {
    #[default]
    NoOp,
    Unbond {
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    WithdrawFees,
}

/// A snapshot claim.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotClaim {
    pub delegator: Address,
    pub identifier: String,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub stake: Amount,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub fees: Amount,
    #[serde_as(as = "Vec<serde_with::hex::Hex>")]
    pub proof: Vec<Hash>,
    #[serde(default)]
    pub followup: FollowupInstruction,
}

/// Result of the follow-up step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowupOutcome {
    None,
    Unbonded { lock_id: u64 },
    FeesWithdrawn { amount: Amount },
}

/// Result of a snapshot claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotClaimReceipt {
    pub claim: ClaimReceipt,
    pub followup: FollowupOutcome,
}

enum FollowupPlan {
    None,
    Unbond(UnbondPlan),
    WithdrawFees(WithdrawFeesPlan),
}

/// Verifies snapshot claims against published roots.
#[derive(Clone, Debug, Default)]
pub struct SnapshotClaimGateway {
    registry: SnapshotRegistry,
}

impl SnapshotClaimGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    /// Publish a snapshot root. Governor only, once per identifier.
    ///
    /// # Errors
    ///
    /// - [`BondingError::Unauthorized`] if `caller` is not the governor
    /// - [`SnapshotError::RootAlreadyPublished`] if the identifier is taken
    pub fn publish_root<R: RoundsManager>(
        &mut self,
        manager: &mut BondingManager<R>,
        caller: Address,
        identifier: &str,
        root: Hash,
        snapshot_round: Round,
    ) -> Result<()> {
        if caller != manager.config().governor {
            tracing::warn!(%caller, identifier, "rejected snapshot root publication");
            return Err(BondingError::Unauthorized { caller }.into());
        }
        self.registry.publish(
            identifier,
            SnapshotRoot {
                root,
                round: snapshot_round,
            },
        )?;

        tracing::info!(identifier, snapshot_round, "snapshot root published");
        manager.emit(AccountingEvent::SnapshotRootPublished {
            identifier: identifier.to_string(),
            root,
            snapshot_round,
        });
        Ok(())
    }

    /// Accept `claim`'s balances as the delegator's checkpoint at the
    /// snapshot round, then run its follow-up.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`SnapshotError::UnknownSnapshot`] if the identifier was never published
    /// - [`SnapshotError::SnapshotAfterCutover`] if the policy forbids the snapshot round
    /// - [`BondingError::FutureRound`] if the snapshot round is after the current round
    /// - [`SnapshotError::InvalidProof`] if the leaf is not under the root
    /// - [`BondingError::UnknownDelegator`] / [`BondingError::Unauthorized`]
    /// - [`BondingError::StaleRound`] if the delegator is already checkpointed at or after the snapshot round
    /// - any error of the follow-up
    pub fn claim_snapshot_earnings<R: RoundsManager>(
        &self,
        manager: &mut BondingManager<R>,
        caller: Address,
        claim: SnapshotClaim,
    ) -> Result<SnapshotClaimReceipt> {
        let current = manager.require_initialized()?;
        let root = self.registry.get(&claim.identifier)?;
        self.check_cutover(manager, root.round)?;

        if root.round > current {
            return Err(BondingError::FutureRound {
                requested: root.round,
                current,
            }
            .into());
        }

        let leaf = snapshot_leaf(&claim.delegator, claim.stake, claim.fees);
        if !verify_proof(&root.root, &leaf, &claim.proof) {
            tracing::warn!(delegator = %claim.delegator, identifier = %claim.identifier, "invalid snapshot proof");
            return Err(SnapshotError::InvalidProof);
        }

        let existing = manager
            .delegator(&claim.delegator)
            .ok_or(BondingError::UnknownDelegator(claim.delegator))?;
        if !existing.may_claim(claim.delegator, caller) {
            return Err(BondingError::Unauthorized { caller }.into());
        }
        if existing.last_claim_round >= root.round {
            return Err(BondingError::StaleRound {
                requested: root.round,
                checkpoint: existing.last_claim_round,
            }
            .into());
        }

        let checkpoint = SnapshotCheckpoint {
            identifier: claim.identifier,
            round: root.round,
            stake: claim.stake,
            fees: claim.fees,
        };
        let state = manager.snapshot_delegator_state(claim.delegator, &checkpoint)?;
        let plan = match claim.followup {
            FollowupInstruction::NoOp => FollowupPlan::None,
            FollowupInstruction::Unbond { amount } => {
                FollowupPlan::Unbond(manager.plan_unbond_for(claim.delegator, &state, amount)?)
            }
            FollowupInstruction::WithdrawFees => {
                FollowupPlan::WithdrawFees(manager.plan_withdraw_fees_for(claim.delegator, &state)?)
            }
        };

        let receipt = manager.commit_snapshot_checkpoint(claim.delegator, checkpoint)?;
        let followup = match plan {
            FollowupPlan::None => FollowupOutcome::None,
            FollowupPlan::Unbond(plan) => FollowupOutcome::Unbonded {
                lock_id: manager.commit_unbond(plan),
            },
            FollowupPlan::WithdrawFees(plan) => FollowupOutcome::FeesWithdrawn {
                amount: manager.commit_withdraw_fees(plan),
            },
        };

        Ok(SnapshotClaimReceipt {
            claim: receipt,
            followup,
        })
    }

    fn check_cutover<R: RoundsManager>(
        &self,
        manager: &BondingManager<R>,
        snapshot_round: Round,
    ) -> Result<()> {
        let policy = manager.config().snapshot_cutover_policy;
        match manager.regime_boundary() {
            Some(boundary)
                if snapshot_round >= boundary
                    && policy == SnapshotCutoverPolicy::ForbidPostCutover =>
            {
                Err(SnapshotError::SnapshotAfterCutover {
                    snapshot_round,
                    boundary,
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::{SnapshotEntry, SnapshotTree};
    use bondline_bonding::rounds::ManualRounds;
    use bondline_bonding::BondingConfig;

    const GOVERNOR: Address = Address::repeat_byte(0xee);
    const T: Address = Address::repeat_byte(1);
    const D: Address = Address::repeat_byte(2);
    const OTHER: Address = Address::repeat_byte(3);

    /// T 1000 self, D 3000; reward 1000 in round 2; snapshot at round 2
    /// published in round 3.
    fn setup() -> (BondingManager, SnapshotClaimGateway, SnapshotTree) {
        let config = BondingConfig {
            governor: GOVERNOR,
            ..Default::default()
        };
        let mut m = BondingManager::new(config, ManualRounds::new(1));
        m.register_transcoder(T, 500_000, 500_000).expect("register");
        m.bond(T, T, 1000).expect("self bond");
        m.bond(D, T, 3000).expect("bond");
        m.rounds_mut().advance();
        m.record_reward(T, 1000).expect("reward");
        m.record_fee(T, 400).expect("fee");
        m.rounds_mut().advance();

        let tree = SnapshotTree::build(vec![
            SnapshotEntry {
                delegator: D,
                stake: 3375,
                fees: 150,
            },
            SnapshotEntry {
                delegator: OTHER,
                stake: 1,
                fees: 0,
            },
        ])
        .expect("tree");
        let mut gateway = SnapshotClaimGateway::new();
        gateway
            .publish_root(&mut m, GOVERNOR, "s2", tree.root(), 2)
            .expect("publish");
        (m, gateway, tree)
    }

    fn claim_for(tree: &SnapshotTree, followup: FollowupInstruction) -> SnapshotClaim {
        let entry = tree.entry(&D).expect("entry");
        SnapshotClaim {
            delegator: D,
            identifier: "s2".to_string(),
            stake: entry.stake,
            fees: entry.fees,
            proof: tree.proof(&D).expect("proof").expect("indexed"),
            followup,
        }
    }

    #[test]
    fn test_publish_governor_only() {
        let (mut m, mut gateway, tree) = setup();
        assert_eq!(
            gateway
                .publish_root(&mut m, T, "s3", tree.root(), 2)
                .unwrap_err(),
            SnapshotError::Bonding(BondingError::Unauthorized { caller: T })
        );
        assert_eq!(
            gateway
                .publish_root(&mut m, GOVERNOR, "s2", [0u8; 32], 2)
                .unwrap_err(),
            SnapshotError::RootAlreadyPublished("s2".to_string())
        );
    }

    #[test]
    fn test_claim_sets_checkpoint() {
        let (mut m, gateway, tree) = setup();
        let receipt = gateway
            .claim_snapshot_earnings(&mut m, D, claim_for(&tree, FollowupInstruction::NoOp))
            .expect("claim");
        assert_eq!(receipt.followup, FollowupOutcome::None);
        assert_eq!(receipt.claim.new_checkpoint, 2);

        let state = m.delegator(&D).expect("delegator");
        assert_eq!(state.bonded_amount, 3375);
        assert_eq!(state.fees, 150);
        assert_eq!(state.last_claim_round, 2);
    }

    #[test]
    fn test_invalid_proof_leaves_state() {
        let (mut m, gateway, tree) = setup();
        let before = m.delegator(&D).expect("delegator").clone();
        let mut claim = claim_for(&tree, FollowupInstruction::NoOp);
        claim.stake += 1;
        assert_eq!(
            gateway.claim_snapshot_earnings(&mut m, D, claim).unwrap_err(),
            SnapshotError::InvalidProof
        );
        assert_eq!(m.delegator(&D).expect("delegator"), &before);
    }

    #[test]
    fn test_claim_twice_is_stale() {
        let (mut m, gateway, tree) = setup();
        gateway
            .claim_snapshot_earnings(&mut m, D, claim_for(&tree, FollowupInstruction::NoOp))
            .expect("first");
        assert_eq!(
            gateway
                .claim_snapshot_earnings(&mut m, D, claim_for(&tree, FollowupInstruction::NoOp))
                .unwrap_err(),
            SnapshotError::Bonding(BondingError::StaleRound {
                requested: 2,
                checkpoint: 2
            })
        );
    }

    #[test]
    fn test_claim_requires_initialized_round() {
        let (mut m, gateway, tree) = setup();
        m.rounds_mut().advance_uninitialized();
        let before = m.delegator(&D).expect("delegator").clone();
        assert_eq!(
            gateway
                .claim_snapshot_earnings(&mut m, D, claim_for(&tree, FollowupInstruction::NoOp))
                .unwrap_err(),
            SnapshotError::Bonding(BondingError::RoundNotInitialized { round: 4 })
        );
        assert_eq!(m.delegator(&D).expect("delegator"), &before);
    }

    #[test]
    fn test_unknown_snapshot() {
        let (mut m, gateway, tree) = setup();
        let mut claim = claim_for(&tree, FollowupInstruction::NoOp);
        claim.identifier = "nope".to_string();
        assert_eq!(
            gateway.claim_snapshot_earnings(&mut m, D, claim).unwrap_err(),
            SnapshotError::UnknownSnapshot("nope".to_string())
        );
    }

    #[test]
    fn test_followup_unbond() {
        let (mut m, gateway, tree) = setup();
        let receipt = gateway
            .claim_snapshot_earnings(
                &mut m,
                D,
                claim_for(&tree, FollowupInstruction::Unbond { amount: 375 }),
            )
            .expect("claim");
        assert!(matches!(receipt.followup, FollowupOutcome::Unbonded { .. }));
        let state = m.delegator(&D).expect("delegator");
        assert_eq!(state.bonded_amount, 3000);
        assert_eq!(state.last_claim_round, 3);
    }

    #[test]
    fn test_failing_followup_rejects_claim() {
        let (mut m, gateway, tree) = setup();
        let before = m.delegator(&D).expect("delegator").clone();
        let err = gateway
            .claim_snapshot_earnings(
                &mut m,
                D,
                claim_for(&tree, FollowupInstruction::Unbond { amount: 4000 }),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SnapshotError::Bonding(BondingError::InsufficientStake {
                requested: 4000,
                bonded: 3375
            })
        );
        assert_eq!(m.delegator(&D).expect("delegator"), &before);
    }

    #[test]
    fn test_followup_withdraw_fees() {
        let (mut m, gateway, tree) = setup();
        let receipt = gateway
            .claim_snapshot_earnings(
                &mut m,
                D,
                claim_for(&tree, FollowupInstruction::WithdrawFees),
            )
            .expect("claim");
        assert_eq!(receipt.followup, FollowupOutcome::FeesWithdrawn { amount: 150 });
    }

    #[test]
    fn test_proxy_may_submit() {
        let (mut m, gateway, tree) = setup();
        assert!(gateway
            .claim_snapshot_earnings(&mut m, OTHER, claim_for(&tree, FollowupInstruction::NoOp))
            .is_err());
        m.approve_claim_proxy(D, OTHER).expect("approve");
        gateway
            .claim_snapshot_earnings(&mut m, OTHER, claim_for(&tree, FollowupInstruction::NoOp))
            .expect("proxy claim");
    }

    #[test]
    fn test_followup_json() {
        let claim: FollowupInstruction =
            serde_json::from_str(r#"{"kind":"unbond","amount":"123456789012345678901234567890"}"#)
                .expect("parse");
        assert_eq!(
            claim,
            FollowupInstruction::Unbond {
                amount: 123_456_789_012_345_678_901_234_567_890
            }
        );
    }
}
