//! Engine state.
//!
//! The manager is a synchronous state machine: every public mutating method
//! either applies completely or returns an error with no state touched.
//! Operations that need several writes compute a plan first and commit it
//! only once every check has passed.

use std::collections::BTreeMap;

use bondline_earnings::ledger::Split;
use bondline_earnings::RecordKind;
use bondline_types::events::{AccountingEvent, EventRecord};
use bondline_types::{Address, Amount, Regime, Round};
use serde::{Deserialize, Serialize};

use crate::config::BondingConfig;
use crate::minter::Minter;
use crate::projector::AccrualProjector;
use crate::rounds::{ManualRounds, RoundsManager};
use crate::state::{Delegator, Transcoder};
use crate::{BondingError, Result};

/// Externally pushed ledger updates.
///
/// Reward minting and fee redemption happen outside the engine; they reach
/// the ledger only through these commands so the once-per-round rule is
/// enforced in one place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCommand {
    RecordReward { transcoder: Address, amount: Amount },
    /// Fees redeemed for `transcoder` (ticket redemption).
    RecordFee { transcoder: Address, amount: Amount },
}

/// The accounting engine.
#[derive(Debug)]
pub struct BondingManager<R: RoundsManager = ManualRounds> {
    pub(crate) config: BondingConfig,
    pub(crate) rounds: R,
    pub(crate) regime_boundary: Option<Round>,
    pub(crate) transcoders: BTreeMap<Address, Transcoder>,
    pub(crate) delegators: BTreeMap<Address, Delegator>,
    pub(crate) next_lock_id: u64,
    outbox: Vec<EventRecord>,
    sequence: u64,
}

impl<R: RoundsManager> BondingManager<R> {
    pub fn new(config: BondingConfig, rounds: R) -> Self {
        Self {
            config,
            rounds,
            regime_boundary: None,
            transcoders: BTreeMap::new(),
            delegators: BTreeMap::new(),
            next_lock_id: 0,
            outbox: Vec::new(),
            sequence: 0,
        }
    }

    pub fn config(&self) -> &BondingConfig {
        &self.config
    }

    pub fn rounds(&self) -> &R {
        &self.rounds
    }

    pub fn rounds_mut(&mut self) -> &mut R {
        &mut self.rounds
    }

    pub fn current_round(&self) -> Round {
        self.rounds.current_round()
    }

    pub fn regime_boundary(&self) -> Option<Round> {
        self.regime_boundary
    }

    /// Regime rounds are recorded under.
    pub fn regime_at(&self, round: Round) -> Regime {
        match self.regime_boundary {
            Some(boundary) if round >= boundary => Regime::Cumulative,
            _ => Regime::Legacy,
        }
    }

    pub fn transcoder(&self, address: &Address) -> Option<&Transcoder> {
        self.transcoders.get(address)
    }

    pub fn transcoders(&self) -> impl Iterator<Item = &Transcoder> {
        self.transcoders.values()
    }

    pub fn delegator(&self, address: &Address) -> Option<&Delegator> {
        self.delegators.get(address)
    }

    pub fn delegators(&self) -> impl Iterator<Item = (&Address, &Delegator)> {
        self.delegators.iter()
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.transcoders.contains_key(address)
    }

    /// Total stake of `transcoder` active in `round`.
    ///
    /// # Errors
    ///
    /// - [`BondingError::UnknownTranscoder`] if `transcoder` is not registered
    pub fn transcoder_stake_at(&self, transcoder: &Address, round: Round) -> Result<Amount> {
        Ok(self.registered(transcoder)?.ledger.stake_at(round))
    }

    pub(crate) fn registered(&self, transcoder: &Address) -> Result<&Transcoder> {
        self.transcoders
            .get(transcoder)
            .ok_or(BondingError::UnknownTranscoder(*transcoder))
    }

    pub(crate) fn registered_mut(&mut self, transcoder: &Address) -> Result<&mut Transcoder> {
        self.transcoders
            .get_mut(transcoder)
            .ok_or(BondingError::UnknownTranscoder(*transcoder))
    }

    pub(crate) fn known_delegator(&self, delegator: &Address) -> Result<&Delegator> {
        self.delegators
            .get(delegator)
            .ok_or(BondingError::UnknownDelegator(*delegator))
    }

    /// Projector over `transcoder`'s ledger with the engine's settings.
    ///
    /// # Errors
    ///
    /// - [`BondingError::UnknownTranscoder`] if `transcoder` is not registered
    pub fn projector_for(&self, transcoder: &Address) -> Result<AccrualProjector<'_>> {
        let transcoder = self.registered(transcoder)?;
        Ok(AccrualProjector::new(
            &transcoder.ledger,
            self.regime_boundary,
            self.config.max_legacy_rounds_per_claim,
            self.config.snapshot_cutover_policy,
        ))
    }

    /// The current round, if it has been initialized.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] otherwise
    pub fn require_initialized(&self) -> Result<Round> {
        let round = self.current_round();
        if !self.rounds.round_started(round) {
            return Err(BondingError::RoundNotInitialized { round });
        }
        Ok(round)
    }

    pub(crate) fn require_governor(&self, caller: Address, action: &str) -> Result<()> {
        if caller != self.config.governor {
            tracing::warn!(%caller, action, "rejected privileged action");
            return Err(BondingError::Unauthorized { caller });
        }
        Ok(())
    }

    // ------------------------------------------------------------ boundary

    /// Set the first round of the cumulative regime. Governor only, once.
    ///
    /// # Errors
    ///
    /// - [`BondingError::Unauthorized`] if `caller` is not the governor
    /// - [`BondingError::BoundaryAlreadySet`] on a second call
    /// - [`BondingError::BoundaryInPast`] if `round` is before the current round
    pub fn set_regime_boundary(&mut self, caller: Address, round: Round) -> Result<()> {
        self.require_governor(caller, "set_regime_boundary")?;
        if let Some(existing) = self.regime_boundary {
            return Err(BondingError::BoundaryAlreadySet(existing));
        }
        let current = self.current_round();
        if round < current {
            return Err(BondingError::BoundaryInPast {
                requested: round,
                current,
            });
        }

        self.regime_boundary = Some(round);
        tracing::info!(boundary = round, "regime boundary set");
        self.emit(AccountingEvent::RegimeBoundarySet { boundary: round });
        Ok(())
    }

    // ------------------------------------------------------------- records

    /// Record `amount` of minted rewards for `transcoder` in the current round.
    ///
    /// The split is computed with the transcoder's current reward cut. Legacy
    /// rounds fill the round's pools; cumulative rounds advance the reward factor
    /// and the transcoder's own cut.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`BondingError::UnknownTranscoder`] if `transcoder` is not registered
    /// - [`bondline_earnings::EarningsError::AlreadyRecordedThisRound`] on a second reward this round
    /// - [`bondline_earnings::EarningsError::NoActiveStake`] if the transcoder has no active stake
    pub fn record_reward(&mut self, transcoder: Address, amount: Amount) -> Result<Split> {
        let round = self.require_initialized()?;
        let regime = self.regime_at(round);
        let split = self
            .registered_mut(&transcoder)?
            .ledger
            .record_reward(round, amount, regime)?;

        tracing::info!(%transcoder, round, amount, ?regime, "reward recorded");
        self.emit(AccountingEvent::Reward {
            transcoder,
            amount,
            delegators_share: split.delegators,
            commission: split.commission,
            regime,
        });
        Ok(split)
    }

    /// Record `amount` of fees redeemed for `transcoder` in the current round.
    ///
    /// # Errors
    ///
    /// - [`BondingError::RoundNotInitialized`] if the current round is not initialized
    /// - [`BondingError::UnknownTranscoder`] if `transcoder` is not registered
    /// - [`bondline_earnings::EarningsError::AlreadyRecordedThisRound`] on a second fee record this round
    /// - [`bondline_earnings::EarningsError::NoActiveStake`] if the transcoder has no active stake
    pub fn record_fee(&mut self, transcoder: Address, amount: Amount) -> Result<Split> {
        let round = self.require_initialized()?;
        let regime = self.regime_at(round);
        let split = self
            .registered_mut(&transcoder)?
            .ledger
            .record_fee(round, amount, regime)?;

        tracing::info!(%transcoder, round, amount, ?regime, "fees recorded");
        self.emit(AccountingEvent::FeesRecorded {
            transcoder,
            amount,
            delegators_share: split.delegators,
            commission: split.commission,
            regime,
        });
        Ok(split)
    }

    /// Mint this round's rewards for `transcoder` and record them.
    ///
    /// The once-per-round and active-stake checks run before minting, so a
    /// rejected call mints nothing.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_reward`].
    pub fn reward<M: Minter>(&mut self, transcoder: Address, minter: &mut M) -> Result<Split> {
        let round = self.require_initialized()?;
        let ledger = &self.registered(&transcoder)?.ledger;
        if ledger.is_recorded(round, RecordKind::Reward) {
            return Err(bondline_earnings::EarningsError::AlreadyRecordedThisRound {
                kind: RecordKind::Reward,
                round,
            }
            .into());
        }
        let active_stake = ledger.stake_at(round);
        if active_stake == 0 {
            return Err(bondline_earnings::EarningsError::NoActiveStake { round }.into());
        }

        let minted = minter.mint_rewards(transcoder, active_stake);
        self.record_reward(transcoder, minted)
    }

    /// Apply an externally pushed ledger command.
    pub fn apply(&mut self, command: LedgerCommand) -> Result<Split> {
        match command {
            LedgerCommand::RecordReward { transcoder, amount } => {
                self.record_reward(transcoder, amount)
            }
            LedgerCommand::RecordFee { transcoder, amount } => self.record_fee(transcoder, amount),
        }
    }

    // -------------------------------------------------------------- events

    /// Append an event to the outbox.
    pub fn emit(&mut self, event: AccountingEvent) {
        self.sequence += 1;
        self.outbox.push(EventRecord {
            sequence: self.sequence,
            round: self.current_round(),
            event,
        });
    }

    /// Events emitted since the last drain.
    pub fn events(&self) -> &[EventRecord] {
        &self.outbox
    }

    /// Take all pending events.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minter::FixedMinter;

    const GOVERNOR: Address = Address::repeat_byte(0xee);
    const T: Address = Address::repeat_byte(1);

    fn manager() -> BondingManager {
        let config = BondingConfig {
            governor: GOVERNOR,
            ..Default::default()
        };
        let mut manager = BondingManager::new(config, ManualRounds::new(1));
        manager
            .register_transcoder(T, 500_000, 500_000)
            .expect("register");
        manager.bond(T, T, 1000).expect("self bond");
        manager.rounds_mut().advance();
        manager
    }

    #[test]
    fn test_regime_boundary_governor_only() {
        let mut m = manager();
        assert_eq!(
            m.set_regime_boundary(T, 5).unwrap_err(),
            BondingError::Unauthorized { caller: T }
        );
        m.set_regime_boundary(GOVERNOR, 5).expect("set boundary");
        assert_eq!(m.regime_boundary(), Some(5));
        assert_eq!(
            m.set_regime_boundary(GOVERNOR, 6).unwrap_err(),
            BondingError::BoundaryAlreadySet(5)
        );
    }

    #[test]
    fn test_regime_boundary_not_in_past() {
        let mut m = manager();
        assert_eq!(
            m.set_regime_boundary(GOVERNOR, 1).unwrap_err(),
            BondingError::BoundaryInPast {
                requested: 1,
                current: 2
            }
        );
        m.set_regime_boundary(GOVERNOR, 2).expect("current round allowed");
    }

    #[test]
    fn test_regime_at() {
        let mut m = manager();
        assert_eq!(m.regime_at(100), Regime::Legacy);
        m.set_regime_boundary(GOVERNOR, 4).expect("set boundary");
        assert_eq!(m.regime_at(3), Regime::Legacy);
        assert_eq!(m.regime_at(4), Regime::Cumulative);
    }

    #[test]
    fn test_reward_checks_before_minting() {
        let mut m = manager();
        let mut minter = FixedMinter::new(100);
        m.reward(T, &mut minter).expect("first reward");
        assert!(m.reward(T, &mut minter).is_err());
        assert_eq!(minter.total_minted(), 100);
    }

    #[test]
    fn test_record_requires_initialized_round() {
        let mut m = manager();
        m.rounds_mut().advance_uninitialized();
        assert_eq!(
            m.record_reward(T, 10).unwrap_err(),
            BondingError::RoundNotInitialized { round: 3 }
        );
    }

    #[test]
    fn test_apply_commands() {
        let mut m = manager();
        let split = m
            .apply(LedgerCommand::RecordReward {
                transcoder: T,
                amount: 1000,
            })
            .expect("reward");
        assert_eq!(split.commission, 500);
        m.apply(LedgerCommand::RecordFee {
            transcoder: T,
            amount: 10,
        })
        .expect("fee");
        let dup = m.apply(LedgerCommand::RecordFee {
            transcoder: T,
            amount: 10,
        });
        assert!(matches!(dup, Err(BondingError::Earnings(_))));
    }

    #[test]
    fn test_unknown_transcoder() {
        let mut m = manager();
        let other = Address::repeat_byte(9);
        assert_eq!(
            m.record_fee(other, 1).unwrap_err(),
            BondingError::UnknownTranscoder(other)
        );
    }

    #[test]
    fn test_event_sequence() {
        let mut m = manager();
        m.record_reward(T, 1000).expect("reward");
        let events = m.drain_events();
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(events[2].event.event_type(), "reward");
        assert_eq!(events[2].round, 2);
        assert!(m.events().is_empty());
    }
}
