//! Claiming accrued earnings.
//!
//! A claim projects the delegator's balance to `upto` and stores the result as
//! its new checkpoint. Claims are split into a plan (all checks, no writes)
//! and a commit (writes only), so callers composing several steps can validate
//! all of them before touching state.

use bondline_types::events::AccountingEvent;
use bondline_types::{Address, Amount, Round};

use crate::manager::BondingManager;
use crate::projector::Accrual;
use crate::rounds::RoundsManager;
use crate::state::{CheckpointSource, Delegator};
use crate::{BondingError, Result};

/// A validated claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimPlan {
    pub delegator: Address,
    pub delegate: Option<Address>,
    /// Checkpoint before the claim.
    pub previous_checkpoint: Round,
    /// Checkpoint after the claim.
    pub upto: Round,
    previous_stake: Amount,
    previous_fees: Amount,
    /// Balances projected to `upto`.
    pub accrual: Accrual,
}

impl ClaimPlan {
    /// Claiming up to the current checkpoint changes nothing.
    pub fn is_noop(&self) -> bool {
        self.upto == self.previous_checkpoint
    }

    fn receipt(&self) -> ClaimReceipt {
        ClaimReceipt {
            delegate: self.delegate,
            rewards: self.accrual.stake.saturating_sub(self.previous_stake),
            fees: self.accrual.fees.saturating_sub(self.previous_fees),
            previous_checkpoint: self.previous_checkpoint,
            new_checkpoint: self.upto,
        }
    }
}

/// Outcome of a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub delegate: Option<Address>,
    /// Realized stake growth.
    pub rewards: Amount,
    /// Realized fee growth.
    pub fees: Amount,
    pub previous_checkpoint: Round,
    pub new_checkpoint: Round,
}

/// Balances a snapshot leaf attests to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotCheckpoint {
    pub identifier: String,
    pub round: Round,
    pub stake: Amount,
    pub fees: Amount,
}

impl<R: RoundsManager> BondingManager<R> {
    /// Pending stake of `delegator` at `target`.
    ///
    /// # Errors
    ///
    /// - [`BondingError::FutureRound`] if `target` is after the current round
    /// - [`BondingError::UnknownDelegator`] if `delegator` never bonded
    /// - [`BondingError::TooManyRoundsToClaim`] if the legacy walk is too long
    pub fn pending_stake(&self, delegator: Address, target: Round) -> Result<Amount> {
        Ok(self.pending(delegator, target)?.stake)
    }

    /// Pending fees of `delegator` at `target`.
    pub fn pending_fees(&self, delegator: Address, target: Round) -> Result<Amount> {
        Ok(self.pending(delegator, target)?.fees)
    }

    fn pending(&self, address: Address, target: Round) -> Result<Accrual> {
        let current = self.current_round();
        if target > current {
            return Err(BondingError::FutureRound {
                requested: target,
                current,
            });
        }
        let delegator = self.known_delegator(&address)?;
        match delegator.delegate {
            Some(delegate) => {
                self.projector_for(&delegate)?
                    .project(delegator, delegate == address, target)
            }
            None => Ok(Accrual::unchanged(delegator)),
        }
    }

    /// Validate a claim of `delegator` (in state `state`) up to `upto`.
    ///
    /// `state` need not be the stored record: snapshot claims plan follow-ups
    /// against the state the snapshot would produce.
    ///
    /// # Errors
    ///
    /// - [`BondingError::FutureRound`] if `upto` is after the current round
    /// - [`BondingError::StaleRound`] if `upto` is before the checkpoint
    /// - [`BondingError::TooManyRoundsToClaim`] if the legacy walk is too long
    pub fn plan_claim_for(
        &self,
        delegator: Address,
        state: &Delegator,
        upto: Round,
    ) -> Result<ClaimPlan> {
        let current = self.current_round();
        if upto > current {
            return Err(BondingError::FutureRound {
                requested: upto,
                current,
            });
        }
        let checkpoint = state.last_claim_round;
        if upto < checkpoint {
            return Err(BondingError::StaleRound {
                requested: upto,
                checkpoint,
            });
        }

        let accrual = match state.delegate {
            Some(delegate) if upto > checkpoint => {
                self.projector_for(&delegate)?
                    .project(state, delegate == delegator, upto)?
            }
            _ => Accrual::unchanged(state),
        };

        Ok(ClaimPlan {
            delegator,
            delegate: state.delegate,
            previous_checkpoint: checkpoint,
            upto,
            previous_stake: state.bonded_amount,
            previous_fees: state.fees,
            accrual,
        })
    }

    /// Write a plan produced by [`Self::plan_claim_for`] with no state change
    /// in between.
    pub fn commit_claim(&mut self, plan: ClaimPlan) -> ClaimReceipt {
        let receipt = plan.receipt();
        if plan.is_noop() {
            return receipt;
        }

        let current = self.current_round();
        if let Some(transcoder) = plan.delegate.and_then(|d| self.transcoders.get_mut(&d)) {
            let rewards = plan.accrual.transcoder_rewards.is_some();
            let fees = plan.accrual.transcoder_fees.is_some();
            if rewards || fees {
                transcoder
                    .ledger
                    .realize_transcoder_cut(plan.upto, current, rewards, fees);
            }
        }

        if let Some(delegator) = self.delegators.get_mut(&plan.delegator) {
            delegator.bonded_amount = plan.accrual.stake;
            delegator.fees = plan.accrual.fees;
            delegator.last_claim_round = plan.upto;
            delegator.checkpoint_source = CheckpointSource::Claim;
        }

        tracing::info!(
            delegator = %plan.delegator,
            previous = plan.previous_checkpoint,
            upto = plan.upto,
            rewards = receipt.rewards,
            fees = receipt.fees,
            "earnings claimed"
        );
        self.emit(AccountingEvent::EarningsClaimed {
            delegate: plan.delegate.unwrap_or(Address::ZERO),
            delegator: plan.delegator,
            rewards: receipt.rewards,
            fees: receipt.fees,
            previous_checkpoint: plan.previous_checkpoint,
            new_checkpoint: plan.upto,
            snapshot: None,
        });
        receipt
    }

    /// Realize `delegator`'s earnings up to `upto`. `caller` must be the
    /// delegator or one of its approved claim proxies.
    ///
    /// Repeating a claim for the same round is a no-op.
    ///
    /// # Arguments
    ///
    /// * `caller` - Account submitting the claim
    /// * `delegator` - Account whose earnings are realized
    /// * `upto` - New checkpoint round, at most the current round
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`BondingError::UnknownDelegator`] if `delegator` never bonded
    /// - [`BondingError::Unauthorized`] if `caller` is neither the delegator nor an approved proxy
    /// - any error of [`Self::plan_claim_for`]
    pub fn claim_earnings(
        &mut self,
        caller: Address,
        delegator: Address,
        upto: Round,
    ) -> Result<ClaimReceipt> {
        self.require_initialized()?;
        let state = self.known_delegator(&delegator)?;
        if !state.may_claim(delegator, caller) {
            tracing::warn!(%caller, %delegator, "claim by unapproved caller");
            return Err(BondingError::Unauthorized { caller });
        }
        let plan = self.plan_claim_for(delegator, state, upto)?;
        Ok(self.commit_claim(plan))
    }

    /// Allow `proxy` to claim on behalf of `delegator`.
    ///
    /// # Errors
    ///
    /// - [`BondingError::UnknownDelegator`] if `delegator` never bonded
    pub fn approve_claim_proxy(&mut self, delegator: Address, proxy: Address) -> Result<()> {
        let state = self
            .delegators
            .get_mut(&delegator)
            .ok_or(BondingError::UnknownDelegator(delegator))?;
        state.claim_proxies.insert(proxy);
        self.emit(AccountingEvent::ClaimProxyApproved { delegator, proxy });
        Ok(())
    }

    /// State `delegator` would be in after accepting `checkpoint`.
    pub fn snapshot_delegator_state(
        &self,
        delegator: Address,
        checkpoint: &SnapshotCheckpoint,
    ) -> Result<Delegator> {
        let mut state = self.known_delegator(&delegator)?.clone();
        state.bonded_amount = checkpoint.stake;
        state.fees = checkpoint.fees;
        state.last_claim_round = checkpoint.round;
        state.checkpoint_source = CheckpointSource::Snapshot {
            identifier: checkpoint.identifier.clone(),
        };
        Ok(state)
    }

    /// Replace `delegator`'s checkpoint with snapshot-attested balances.
    ///
    /// The balances are trusted as given; callers verify them first. A
    /// transcoder's own leaf includes its unrealized cut when nothing was
    /// recorded after the snapshot round, so the cut is realized here under
    /// the same condition.
    ///
    /// # Errors
    ///
    /// - [`BondingError::UnknownDelegator`] if `delegator` never bonded
    pub fn commit_snapshot_checkpoint(
        &mut self,
        delegator: Address,
        checkpoint: SnapshotCheckpoint,
    ) -> Result<ClaimReceipt> {
        let next = self.snapshot_delegator_state(delegator, &checkpoint)?;
        let previous = self.known_delegator(&delegator)?;
        let receipt = ClaimReceipt {
            delegate: previous.delegate,
            rewards: checkpoint.stake.saturating_sub(previous.bonded_amount),
            fees: checkpoint.fees.saturating_sub(previous.fees),
            previous_checkpoint: previous.last_claim_round,
            new_checkpoint: checkpoint.round,
        };
        self.delegators.insert(delegator, next);

        let current = self.current_round();
        if let Some(transcoder) = receipt
            .delegate
            .filter(|delegate| *delegate == delegator)
            .and_then(|delegate| self.transcoders.get_mut(&delegate))
        {
            if transcoder.ledger.records_end_by(checkpoint.round) {
                transcoder
                    .ledger
                    .realize_transcoder_cut(checkpoint.round, current, true, true);
            }
        }

        tracing::info!(
            %delegator,
            snapshot = %checkpoint.identifier,
            round = checkpoint.round,
            stake = checkpoint.stake,
            fees = checkpoint.fees,
            "snapshot checkpoint accepted"
        );
        self.emit(AccountingEvent::EarningsClaimed {
            delegate: receipt.delegate.unwrap_or(Address::ZERO),
            delegator,
            rewards: receipt.rewards,
            fees: receipt.fees,
            previous_checkpoint: receipt.previous_checkpoint,
            new_checkpoint: receipt.new_checkpoint,
            snapshot: Some(checkpoint.identifier),
        });
        Ok(receipt)
    }
}
