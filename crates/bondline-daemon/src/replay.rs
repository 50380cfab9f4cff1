//! JSON replay of engine commands.
//!
//! A replay script is a JSON array of commands tagged by `op`. Amounts are
//! decimal strings. Commands are applied one at a time; a rejected command
//! leaves the engine unchanged.

use std::collections::HashMap;
use std::path::Path;

use bondline_bonding::minter::FixedMinter;
use bondline_bonding::rounds::ManualRounds;
use bondline_bonding::{BondingError, BondingManager, LedgerCommand};
use bondline_snapshot::gateway::{FollowupInstruction, SnapshotClaim, SnapshotClaimGateway};
use bondline_snapshot::leaf::{collect_entries, SnapshotTree};
use bondline_snapshot::SnapshotError;
use bondline_types::events::EventRecord;
use bondline_types::{Address, Amount, Hash, Round};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::config::EngineConfig;

/// Errors while replaying a command.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Bonding(#[from] BondingError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The snapshot was not published by this replay, so no proof is known.
    #[error("no snapshot tree for {0}")]
    NoSnapshotTree(String),

    #[error("{delegator} has no entry in snapshot {identifier}")]
    NotInSnapshot {
        identifier: String,
        delegator: Address,
    },
}

pub type Result<T> = std::result::Result<T, ReplayError>;

/// One scripted command.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayCommand {
    AdvanceRound,
    AdvanceTo {
        round: Round,
    },
    RegisterTranscoder {
        transcoder: Address,
        reward_cut: u64,
        fee_share: u64,
    },
    SetTranscoderParams {
        transcoder: Address,
        reward_cut: u64,
        fee_share: u64,
    },
    Bond {
        delegator: Address,
        to: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    Unbond {
        delegator: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    WithdrawStake {
        delegator: Address,
        lock_id: u64,
    },
    WithdrawFees {
        delegator: Address,
    },
    /// Mint the configured per-round reward and record it.
    CallReward {
        transcoder: Address,
    },
    RecordReward {
        transcoder: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    RecordFee {
        transcoder: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    SetRegimeBoundary {
        caller: Address,
        round: Round,
    },
    ApproveClaimProxy {
        delegator: Address,
        proxy: Address,
    },
    /// Claim up to `upto` (default: the current round).
    ClaimEarnings {
        #[serde(default)]
        caller: Option<Address>,
        delegator: Address,
        #[serde(default)]
        upto: Option<Round>,
    },
    /// Build a snapshot of all delegators at `round` and publish its root.
    PublishSnapshot {
        caller: Address,
        identifier: String,
        round: Round,
    },
    /// Claim from a snapshot. Omitted balances and proof are taken from the
    /// tree published by this replay.
    ClaimSnapshot {
        #[serde(default)]
        caller: Option<Address>,
        delegator: Address,
        identifier: String,
        #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
        #[serde(default)]
        stake: Option<Amount>,
        #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
        #[serde(default)]
        fees: Option<Amount>,
        #[serde_as(as = "Option<Vec<serde_with::hex::Hex>>")]
        #[serde(default)]
        proof: Option<Vec<Hash>>,
        #[serde(default)]
        followup: FollowupInstruction,
    },
    /// Report pending stake and fees at `round` (default: current).
    Pending {
        delegator: Address,
        #[serde(default)]
        round: Option<Round>,
    },
}

/// Output of a `pending` command.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingReport {
    pub delegator: Address,
    pub round: Round,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub stake: Amount,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub fees: Amount,
}

/// Parse a replay script.
pub fn load_script(path: &Path) -> anyhow::Result<Vec<ReplayCommand>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Engine plus the snapshot state a replay accumulates.
pub struct Replayer {
    manager: BondingManager<ManualRounds>,
    gateway: SnapshotClaimGateway,
    minter: FixedMinter,
    trees: HashMap<String, SnapshotTree>,
}

impl Replayer {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut manager =
            BondingManager::new(config.bonding(), ManualRounds::new(config.start_round));
        if let Some(boundary) = config.regime_boundary {
            manager.set_regime_boundary(config.governor, boundary)?;
        }
        Ok(Self {
            manager,
            gateway: SnapshotClaimGateway::new(),
            minter: FixedMinter::new(config.reward_per_round),
            trees: HashMap::new(),
        })
    }

    pub fn manager(&self) -> &BondingManager<ManualRounds> {
        &self.manager
    }

    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.manager.drain_events()
    }

    /// Apply one command.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::NoSnapshotTree`] / [`ReplayError::NotInSnapshot`] when a snapshot claim cannot be filled in
    /// - any engine or gateway rejection
    pub fn apply(&mut self, command: ReplayCommand) -> Result<Option<PendingReport>> {
        let m = &mut self.manager;
        match command {
            ReplayCommand::AdvanceRound => {
                let round = m.rounds_mut().advance();
                tracing::debug!(round, "round advanced");
            }
            ReplayCommand::AdvanceTo { round } => {
                m.rounds_mut().advance_to(round);
            }
            ReplayCommand::RegisterTranscoder {
                transcoder,
                reward_cut,
                fee_share,
            } => m.register_transcoder(transcoder, reward_cut, fee_share)?,
            ReplayCommand::SetTranscoderParams {
                transcoder,
                reward_cut,
                fee_share,
            } => m.set_transcoder_params(transcoder, reward_cut, fee_share)?,
            ReplayCommand::Bond {
                delegator,
                to,
                amount,
            } => m.bond(delegator, to, amount)?,
            ReplayCommand::Unbond { delegator, amount } => {
                m.unbond(delegator, amount)?;
            }
            ReplayCommand::WithdrawStake { delegator, lock_id } => {
                m.withdraw_stake(delegator, lock_id)?;
            }
            ReplayCommand::WithdrawFees { delegator } => {
                m.withdraw_fees(delegator)?;
            }
            ReplayCommand::CallReward { transcoder } => {
                m.reward(transcoder, &mut self.minter)?;
            }
            ReplayCommand::RecordReward { transcoder, amount } => {
                m.apply(LedgerCommand::RecordReward { transcoder, amount })?;
            }
            ReplayCommand::RecordFee { transcoder, amount } => {
                m.apply(LedgerCommand::RecordFee { transcoder, amount })?;
            }
            ReplayCommand::SetRegimeBoundary { caller, round } => {
                m.set_regime_boundary(caller, round)?
            }
            ReplayCommand::ApproveClaimProxy { delegator, proxy } => {
                m.approve_claim_proxy(delegator, proxy)?
            }
            ReplayCommand::ClaimEarnings {
                caller,
                delegator,
                upto,
            } => {
                let upto = upto.unwrap_or_else(|| m.current_round());
                m.claim_earnings(caller.unwrap_or(delegator), delegator, upto)?;
            }
            ReplayCommand::PublishSnapshot {
                caller,
                identifier,
                round,
            } => {
                let tree = SnapshotTree::build(collect_entries(m, round)?)?;
                self.gateway
                    .publish_root(m, caller, &identifier, tree.root(), round)?;
                self.trees.insert(identifier, tree);
            }
            ReplayCommand::ClaimSnapshot {
                caller,
                delegator,
                identifier,
                stake,
                fees,
                proof,
                followup,
            } => {
                let claim = self.snapshot_claim(delegator, identifier, stake, fees, proof, followup)?;
                self.gateway.claim_snapshot_earnings(
                    &mut self.manager,
                    caller.unwrap_or(delegator),
                    claim,
                )?;
            }
            ReplayCommand::Pending { delegator, round } => {
                let round = round.unwrap_or_else(|| m.current_round());
                return Ok(Some(PendingReport {
                    delegator,
                    round,
                    stake: m.pending_stake(delegator, round)?,
                    fees: m.pending_fees(delegator, round)?,
                }));
            }
        }
        Ok(None)
    }

    fn snapshot_claim(
        &self,
        delegator: Address,
        identifier: String,
        stake: Option<Amount>,
        fees: Option<Amount>,
        proof: Option<Vec<Hash>>,
        followup: FollowupInstruction,
    ) -> Result<SnapshotClaim> {
        if let (Some(stake), Some(fees), Some(proof)) = (stake, fees, proof.clone()) {
            return Ok(SnapshotClaim {
                delegator,
                identifier,
                stake,
                fees,
                proof,
                followup,
            });
        }

        let tree = self
            .trees
            .get(&identifier)
            .ok_or_else(|| ReplayError::NoSnapshotTree(identifier.clone()))?;
        let not_in_snapshot = || ReplayError::NotInSnapshot {
            identifier: identifier.clone(),
            delegator,
        };
        let entry = tree.entry(&delegator).ok_or_else(not_in_snapshot)?;
        let proof = match proof {
            Some(proof) => proof,
            None => tree.proof(&delegator)?.ok_or_else(not_in_snapshot)?,
        };
        Ok(SnapshotClaim {
            delegator,
            stake: stake.unwrap_or(entry.stake),
            fees: fees.unwrap_or(entry.fees),
            proof,
            followup,
            identifier,
        })
    }
}
