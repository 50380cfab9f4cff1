//! Registration, bonding, unbonding and withdrawals.
//!
//! Every operation that changes a delegator's stake first claims its
//! earnings up to the current round, so a delegate change never carries
//! accrual from the old transcoder into the new one.

use bondline_earnings::ledger::EarningsLedger;
use bondline_math::{checked_add, checked_sub};
use bondline_types::events::AccountingEvent;
use bondline_types::{Address, Amount, Round};

use crate::claims::ClaimPlan;
use crate::manager::BondingManager;
use crate::rounds::RoundsManager;
use crate::state::{CheckpointSource, Delegator, Transcoder, UnbondingLock};
use crate::{BondingError, Result};

/// A validated unbond.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnbondPlan {
    pub claim: ClaimPlan,
    pub delegate: Address,
    pub amount: Amount,
    pub lock_id: u64,
    pub withdraw_round: Round,
    remaining: Amount,
    delegate_next_stake: Amount,
}

/// A validated fee withdrawal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawFeesPlan {
    pub claim: ClaimPlan,
    pub amount: Amount,
}

impl<R: RoundsManager> BondingManager<R> {
    /// Register `address` as a transcoder.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`BondingError::TranscoderAlreadyRegistered`] if `address` is already registered
    /// - [`bondline_math::MathError::InvalidPercentage`] if either percentage exceeds 100%
    pub fn register_transcoder(
        &mut self,
        address: Address,
        reward_cut: u64,
        fee_share: u64,
    ) -> Result<()> {
        let round = self.require_initialized()?;
        if self.is_registered(&address) {
            return Err(BondingError::TranscoderAlreadyRegistered(address));
        }
        let ledger = EarningsLedger::new(reward_cut, fee_share)?;
        self.transcoders.insert(
            address,
            Transcoder {
                address,
                registered_round: round,
                ledger,
            },
        );

        tracing::info!(transcoder = %address, reward_cut, fee_share, "transcoder registered");
        self.emit(AccountingEvent::TranscoderRegistered {
            transcoder: address,
            reward_cut,
            fee_share,
        });
        Ok(())
    }

    /// Change reward cut and fee share for rounds recorded from now on.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`BondingError::UnknownTranscoder`] if `address` is not registered
    /// - [`bondline_math::MathError::InvalidPercentage`] if either percentage exceeds 100%
    pub fn set_transcoder_params(
        &mut self,
        address: Address,
        reward_cut: u64,
        fee_share: u64,
    ) -> Result<()> {
        self.require_initialized()?;
        self.registered_mut(&address)?
            .ledger
            .set_params(reward_cut, fee_share)?;
        self.emit(AccountingEvent::TranscoderUpdated {
            transcoder: address,
            reward_cut,
            fee_share,
        });
        Ok(())
    }

    /// Bond `amount` from `delegator` to `to`, moving any existing bond.
    ///
    /// A zero amount is allowed only to move an existing bond.
    ///
    /// Earnings up to the current round are claimed first. The new bond counts
    /// toward `to`'s stake from the next round.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`BondingError::UnknownTranscoder`] if `to` is not registered
    /// - [`BondingError::ZeroAmount`] if `amount` is zero and the bond does not move
    /// - any error of the claim up to the current round
    pub fn bond(&mut self, delegator: Address, to: Address, amount: Amount) -> Result<()> {
        let current = self.require_initialized()?;
        let to_next_stake = self.registered(&to)?.ledger.next_stake(current);

        let claim = match self.delegators.get(&delegator) {
            Some(state) => Some(self.plan_claim_for(delegator, state, current)?),
            None => None,
        };
        let claimed_stake = claim.as_ref().map_or(0, |plan| plan.accrual.stake);
        let old_delegate = claim.as_ref().and_then(|plan| plan.delegate);
        let moving = old_delegate.is_some_and(|old| old != to);
        if amount == 0 && !moving {
            return Err(BondingError::ZeroAmount);
        }

        let bonded = checked_add(claimed_stake, amount)?;
        let old_next_stake = match old_delegate {
            Some(old) if moving => {
                let next = self.registered(&old)?.ledger.next_stake(current);
                Some((old, checked_sub(next, claimed_stake)?))
            }
            _ => None,
        };
        let added = if old_delegate == Some(to) { amount } else { bonded };
        let to_next_stake = checked_add(to_next_stake, added)?;

        if let Some(plan) = claim {
            self.commit_claim(plan);
        }
        if let Some((old, next)) = old_next_stake {
            if let Some(transcoder) = self.transcoders.get_mut(&old) {
                transcoder.ledger.set_next_stake(current, next);
            }
        }
        if let Some(transcoder) = self.transcoders.get_mut(&to) {
            transcoder.ledger.set_next_stake(current, to_next_stake);
        }

        let state = self
            .delegators
            .entry(delegator)
            .or_insert_with(|| Delegator::new(current));
        if state.delegate != Some(to) {
            state.start_round = current + 1;
        }
        state.delegate = Some(to);
        state.bonded_amount = bonded;
        state.last_claim_round = current;
        state.checkpoint_source = CheckpointSource::Claim;

        tracing::info!(%delegator, %to, amount, bonded, moving, "bonded");
        self.emit(AccountingEvent::Bond {
            new_delegate: to,
            old_delegate: old_delegate.filter(|_| moving),
            delegator,
            additional_amount: amount,
            bonded_amount: bonded,
        });
        Ok(())
    }

    /// Validate unbonding `amount` from `delegator` (in state `state`).
    ///
    /// # Errors
    ///
    /// - [`BondingError::ZeroAmount`] if `amount` is zero
    /// - [`BondingError::NotBonded`] if the delegator has no delegate
    /// - [`BondingError::InsufficientStake`] if `amount` exceeds the claimed stake
    pub fn plan_unbond_for(
        &self,
        delegator: Address,
        state: &Delegator,
        amount: Amount,
    ) -> Result<UnbondPlan> {
        let current = self.require_initialized()?;
        if amount == 0 {
            return Err(BondingError::ZeroAmount);
        }
        let delegate = state.delegate.ok_or(BondingError::NotBonded(delegator))?;
        let claim = self.plan_claim_for(delegator, state, current)?;
        let bonded = claim.accrual.stake;
        if amount > bonded {
            return Err(BondingError::InsufficientStake {
                requested: amount,
                bonded,
            });
        }
        let delegate_next_stake =
            checked_sub(self.registered(&delegate)?.ledger.next_stake(current), amount)?;

        Ok(UnbondPlan {
            claim,
            delegate,
            amount,
            lock_id: self.next_lock_id,
            withdraw_round: current + self.config.unbonding_period,
            remaining: bonded - amount,
            delegate_next_stake,
        })
    }

    /// Write a plan produced by [`Self::plan_unbond_for`]. Returns the lock id.
    pub fn commit_unbond(&mut self, plan: UnbondPlan) -> u64 {
        let current = self.current_round();
        let delegator = plan.claim.delegator;
        self.commit_claim(plan.claim);

        if let Some(transcoder) = self.transcoders.get_mut(&plan.delegate) {
            transcoder
                .ledger
                .set_next_stake(current, plan.delegate_next_stake);
        }
        if let Some(state) = self.delegators.get_mut(&delegator) {
            state.bonded_amount = plan.remaining;
            if plan.remaining == 0 {
                state.delegate = None;
            }
            state.unbonding_locks.insert(
                plan.lock_id,
                UnbondingLock {
                    amount: plan.amount,
                    withdraw_round: plan.withdraw_round,
                },
            );
        }
        self.next_lock_id = plan.lock_id + 1;

        tracing::info!(
            %delegator,
            amount = plan.amount,
            lock_id = plan.lock_id,
            withdraw_round = plan.withdraw_round,
            "unbonded"
        );
        self.emit(AccountingEvent::Unbond {
            delegate: plan.delegate,
            delegator,
            lock_id: plan.lock_id,
            amount: plan.amount,
            withdraw_round: plan.withdraw_round,
        });
        plan.lock_id
    }

    /// Unbond `amount`, creating an unbonding lock. Returns the lock id.
    pub fn unbond(&mut self, delegator: Address, amount: Amount) -> Result<u64> {
        let state = self.known_delegator(&delegator)?;
        let plan = self.plan_unbond_for(delegator, state, amount)?;
        Ok(self.commit_unbond(plan))
    }

    /// Withdraw the stake held by an expired unbonding lock.
    ///
    /// A delegator left with no stake, fees or locks is dropped.
    ///
    /// # Errors
    ///
    /// - [`BondingError::LockNotFound`] if there is no such lock
    /// - [`BondingError::LockNotWithdrawable`] before the lock's withdraw round
    pub fn withdraw_stake(&mut self, delegator: Address, lock_id: u64) -> Result<Amount> {
        let current = self.require_initialized()?;
        let lock = *self
            .known_delegator(&delegator)?
            .unbonding_locks
            .get(&lock_id)
            .ok_or(BondingError::LockNotFound(lock_id))?;
        if lock.withdraw_round > current {
            return Err(BondingError::LockNotWithdrawable {
                lock_id,
                withdraw_round: lock.withdraw_round,
            });
        }

        if let Some(state) = self.delegators.get_mut(&delegator) {
            state.unbonding_locks.remove(&lock_id);
        }
        tracing::info!(%delegator, lock_id, amount = lock.amount, "stake withdrawn");
        self.emit(AccountingEvent::WithdrawStake {
            delegator,
            lock_id,
            amount: lock.amount,
        });
        self.release_if_empty(delegator);
        Ok(lock.amount)
    }

    /// Validate withdrawing all fees of `delegator` (in state `state`).
    ///
    /// # Errors
    ///
    /// - [`BondingError::NoFees`] if nothing is left to withdraw after claiming
    pub fn plan_withdraw_fees_for(
        &self,
        delegator: Address,
        state: &Delegator,
    ) -> Result<WithdrawFeesPlan> {
        let current = self.require_initialized()?;
        let claim = self.plan_claim_for(delegator, state, current)?;
        let amount = claim.accrual.fees;
        if amount == 0 {
            return Err(BondingError::NoFees);
        }
        Ok(WithdrawFeesPlan { claim, amount })
    }

    /// Write a plan produced by [`Self::plan_withdraw_fees_for`].
    pub fn commit_withdraw_fees(&mut self, plan: WithdrawFeesPlan) -> Amount {
        let delegator = plan.claim.delegator;
        self.commit_claim(plan.claim);
        if let Some(state) = self.delegators.get_mut(&delegator) {
            state.fees = 0;
        }
        tracing::info!(%delegator, amount = plan.amount, "fees withdrawn");
        self.emit(AccountingEvent::WithdrawFees {
            delegator,
            amount: plan.amount,
        });
        self.release_if_empty(delegator);
        plan.amount
    }

    fn release_if_empty(&mut self, delegator: Address) {
        if self.delegators.get(&delegator).is_some_and(Delegator::is_empty) {
            self.delegators.remove(&delegator);
            tracing::debug!(%delegator, "released empty delegator record");
        }
    }

    /// Claim up to the current round and withdraw all fees.
    pub fn withdraw_fees(&mut self, delegator: Address) -> Result<Amount> {
        let state = self.known_delegator(&delegator)?;
        let plan = self.plan_withdraw_fees_for(delegator, state)?;
        Ok(self.commit_withdraw_fees(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BondingConfig;
    use crate::rounds::ManualRounds;

    const A: Address = Address::repeat_byte(0xa);
    const B: Address = Address::repeat_byte(0xb);
    const D: Address = Address::repeat_byte(0xd);

    fn manager() -> BondingManager {
        let mut m = BondingManager::new(BondingConfig::default(), ManualRounds::new(1));
        m.register_transcoder(A, 500_000, 500_000).expect("register A");
        m.register_transcoder(B, 500_000, 500_000).expect("register B");
        m.bond(A, A, 1000).expect("A self bond");
        m.bond(B, B, 1000).expect("B self bond");
        m.bond(D, A, 3000).expect("D bond");
        m
    }

    #[test]
    fn test_register_twice() {
        let mut m = manager();
        assert_eq!(
            m.register_transcoder(A, 0, 0).unwrap_err(),
            BondingError::TranscoderAlreadyRegistered(A)
        );
    }

    #[test]
    fn test_register_invalid_percentage() {
        let mut m = manager();
        let c = Address::repeat_byte(0xc);
        assert!(matches!(
            m.register_transcoder(c, 1_000_001, 0),
            Err(BondingError::Earnings(_))
        ));
        assert!(!m.is_registered(&c));
    }

    #[test]
    fn test_bond_takes_effect_next_round() {
        let m = manager();
        assert_eq!(m.transcoder_stake_at(&A, 1).expect("stake"), 0);
        assert_eq!(m.transcoder_stake_at(&A, 2).expect("stake"), 4000);
        let d = m.delegator(&D).expect("delegator");
        assert_eq!(d.start_round, 2);
        assert_eq!(d.delegate, Some(A));
    }

    #[test]
    fn test_bond_zero_rejected() {
        let mut m = manager();
        assert_eq!(m.bond(D, A, 0).unwrap_err(), BondingError::ZeroAmount);
        let newcomer = Address::repeat_byte(0x77);
        assert_eq!(m.bond(newcomer, A, 0).unwrap_err(), BondingError::ZeroAmount);
    }

    #[test]
    fn test_bond_unknown_transcoder() {
        let mut m = manager();
        let unknown = Address::repeat_byte(0x99);
        assert_eq!(
            m.bond(D, unknown, 10).unwrap_err(),
            BondingError::UnknownTranscoder(unknown)
        );
    }

    #[test]
    fn test_move_bond_claims_first() {
        let mut m = manager();
        m.rounds_mut().advance();
        m.record_reward(A, 1000).expect("reward");
        m.bond(D, B, 0).expect("move");

        let d = m.delegator(&D).expect("delegator");
        assert_eq!(d.delegate, Some(B));
        assert_eq!(d.bonded_amount, 3375);
        assert_eq!(d.last_claim_round, 2);
        // A: 4000 + 1000 reward - 3375 moved
        assert_eq!(m.transcoder_stake_at(&A, 3).expect("stake"), 1625);
        assert_eq!(m.transcoder_stake_at(&B, 3).expect("stake"), 4375);
    }

    #[test]
    fn test_unbond_and_withdraw() {
        let mut m = manager();
        m.rounds_mut().advance();
        let lock_id = m.unbond(D, 1000).expect("unbond");
        assert_eq!(m.transcoder_stake_at(&A, 3).expect("stake"), 3000);

        let lock = m.delegator(&D).expect("delegator").unbonding_locks[&lock_id];
        assert_eq!(lock.withdraw_round, 2 + 7);
        assert_eq!(
            m.withdraw_stake(D, lock_id).unwrap_err(),
            BondingError::LockNotWithdrawable {
                lock_id,
                withdraw_round: 9
            }
        );

        m.rounds_mut().advance_to(9);
        assert_eq!(m.withdraw_stake(D, lock_id).expect("withdraw"), 1000);
        assert_eq!(
            m.withdraw_stake(D, lock_id).unwrap_err(),
            BondingError::LockNotFound(lock_id)
        );
    }

    #[test]
    fn test_fully_withdrawn_delegator_is_released() {
        let mut m = manager();
        m.rounds_mut().advance();
        m.record_fee(A, 400).expect("fees");
        let lock_id = m.unbond(D, 3000).expect("full unbond");

        // Fees left to withdraw keep the record.
        m.rounds_mut().advance_to(9);
        assert_eq!(m.withdraw_stake(D, lock_id).expect("withdraw"), 3000);
        assert!(m.delegator(&D).is_some());

        assert_eq!(m.withdraw_fees(D).expect("withdraw"), 150);
        assert!(m.delegator(&D).is_none());
        assert_eq!(
            m.pending_stake(D, 9).unwrap_err(),
            BondingError::UnknownDelegator(D)
        );

        m.bond(D, B, 500).expect("bond again");
        assert_eq!(m.delegator(&D).expect("delegator").last_claim_round, 9);
    }

    #[test]
    fn test_unbond_checks() {
        let mut m = manager();
        assert_eq!(m.unbond(D, 0).unwrap_err(), BondingError::ZeroAmount);
        assert_eq!(
            m.unbond(D, 3001).unwrap_err(),
            BondingError::InsufficientStake {
                requested: 3001,
                bonded: 3000
            }
        );
        m.unbond(D, 3000).expect("full unbond");
        assert_eq!(m.delegator(&D).expect("delegator").delegate, None);
        assert_eq!(m.unbond(D, 1).unwrap_err(), BondingError::NotBonded(D));
    }

    #[test]
    fn test_withdraw_fees() {
        let mut m = manager();
        assert_eq!(m.withdraw_fees(D).unwrap_err(), BondingError::NoFees);

        m.rounds_mut().advance();
        m.record_fee(A, 400).expect("fees");
        // 400 * 50% * 3000 / 4000
        assert_eq!(m.withdraw_fees(D).expect("withdraw"), 150);
        assert_eq!(m.delegator(&D).expect("delegator").fees, 0);
    }

    #[test]
    fn test_set_transcoder_params() {
        let mut m = manager();
        m.set_transcoder_params(A, 250_000, 750_000).expect("update");
        let ledger = &m.transcoder(&A).expect("transcoder").ledger;
        assert_eq!(ledger.reward_cut(), 250_000);
        assert_eq!(ledger.fee_share(), 750_000);
    }
}
