//! Pending stake and fee projection.
//!
//! A delegator's balance is stored only as of its checkpoint. Growth up to a
//! target round is computed on demand from its delegate's ledger:
//!
//! 1. Legacy rounds (`checkpoint+1 ..= min(target, boundary)`): walk every
//!    legacy entry and add the delegator's pool share. Fees are computed on
//!    the stake before that round's reward.
//! 2. Cumulative rounds: one ratio of cumulative factors.
//!
//! ```text
//! stake' = stake * CRF(target) / CRF(start)
//! fees'  = fees + stake * (CFF(target) - CFF(start)) / CRF(start)
//! ```
//!
//! A self-delegated transcoder additionally receives its own cut, which is
//! tracked outside the factors.

use bondline_earnings::ledger::EarningsLedger;
use bondline_math::{checked_add, checked_sub, mul_div};
use bondline_types::{Amount, Round};

use crate::config::SnapshotCutoverPolicy;
use crate::state::{CheckpointSource, Delegator};
use crate::{BondingError, Result};

/// Projected balances of a delegator at a target round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accrual {
    pub stake: Amount,
    pub fees: Amount,
    /// Transcoder's own reward cut included in `stake`, if any.
    pub transcoder_rewards: Option<Amount>,
    /// Transcoder's own fee cut included in `fees`, if any.
    pub transcoder_fees: Option<Amount>,
    /// Number of legacy rounds covered by the walk.
    pub legacy_rounds_walked: u64,
}

impl Accrual {
    /// Balances carried unchanged from the checkpoint.
    pub fn unchanged(delegator: &Delegator) -> Self {
        Self {
            stake: delegator.bonded_amount,
            fees: delegator.fees,
            ..Default::default()
        }
    }
}

/// Projects accruals against one transcoder's ledger.
#[derive(Clone, Copy, Debug)]
pub struct AccrualProjector<'a> {
    ledger: &'a EarningsLedger,
    boundary: Option<Round>,
    max_legacy_rounds: u64,
    policy: SnapshotCutoverPolicy,
}

impl<'a> AccrualProjector<'a> {
    pub fn new(
        ledger: &'a EarningsLedger,
        boundary: Option<Round>,
        max_legacy_rounds: u64,
        policy: SnapshotCutoverPolicy,
    ) -> Self {
        Self {
            ledger,
            boundary,
            max_legacy_rounds,
            policy,
        }
    }

    /// Project `delegator` to `target`.
    ///
    /// # Errors
    ///
    /// - [`BondingError::TooManyRoundsToClaim`] if the legacy walk exceeds the bound
    pub fn project(
        &self,
        delegator: &Delegator,
        is_transcoder: bool,
        target: Round,
    ) -> Result<Accrual> {
        let checkpoint = delegator.last_claim_round;
        let mut accrual = Accrual::unchanged(delegator);
        if target <= checkpoint {
            return Ok(accrual);
        }

        if self.boundary.is_none_or(|boundary| checkpoint < boundary) {
            let end = self.boundary.map_or(target, |boundary| target.min(boundary));
            self.walk_legacy(&mut accrual, checkpoint, end, is_transcoder)?;
        }

        if let Some(boundary) = self.boundary.filter(|boundary| *boundary <= target) {
            let start = self.cumulative_start(delegator, boundary);
            self.apply_factors(&mut accrual, start, target)?;
        }

        if is_transcoder {
            self.add_transcoder_cut(&mut accrual, target)?;
        }

        tracing::trace!(
            checkpoint,
            target,
            stake = accrual.stake,
            fees = accrual.fees,
            legacy_rounds = accrual.legacy_rounds_walked,
            "projected accrual"
        );

        Ok(accrual)
    }

    fn walk_legacy(
        &self,
        accrual: &mut Accrual,
        checkpoint: Round,
        end: Round,
        is_transcoder: bool,
    ) -> Result<()> {
        let rounds = end.saturating_sub(checkpoint);
        if rounds > self.max_legacy_rounds {
            return Err(BondingError::TooManyRoundsToClaim {
                rounds,
                max: self.max_legacy_rounds,
            });
        }

        for (_, pool) in self.ledger.legacy_pools(checkpoint + 1..=end) {
            let fees = pool.fee_pool_share(accrual.stake, is_transcoder)?;
            let rewards = pool.reward_pool_share(accrual.stake, is_transcoder)?;
            accrual.fees = checked_add(accrual.fees, fees)?;
            accrual.stake = checked_add(accrual.stake, rewards)?;
        }
        accrual.legacy_rounds_walked = rounds;
        Ok(())
    }

    /// Round whose factors the cumulative step starts from.
    fn cumulative_start(&self, delegator: &Delegator, boundary: Round) -> Round {
        let base = boundary.saturating_sub(1);
        match (&delegator.checkpoint_source, self.policy) {
            (CheckpointSource::Snapshot { .. }, SnapshotCutoverPolicy::Reference) => base,
            _ => delegator.last_claim_round.max(base),
        }
    }

    fn apply_factors(&self, accrual: &mut Accrual, start: Round, target: Round) -> Result<()> {
        let from = self.ledger.factors_at(start);
        let to = self.ledger.factors_at(target);

        let fee_growth = checked_sub(to.fee, from.fee)?;
        let fees = mul_div(accrual.stake, fee_growth, from.reward)?;
        accrual.fees = checked_add(accrual.fees, fees)?;
        accrual.stake = mul_div(accrual.stake, to.reward, from.reward)?;
        Ok(())
    }

    /// Include the transcoder's own cut when no reward or fee was recorded
    /// after `target`. Realizing it earlier would let the realized cut earn a
    /// second time through the factors of the later rounds.
    fn add_transcoder_cut(&self, accrual: &mut Accrual, target: Round) -> Result<()> {
        if !self.ledger.records_end_by(target) {
            return Ok(());
        }

        let rewards = self.ledger.cumulative_rewards();
        let fees = self.ledger.cumulative_fees();
        accrual.stake = checked_add(accrual.stake, rewards)?;
        accrual.fees = checked_add(accrual.fees, fees)?;
        accrual.transcoder_rewards = Some(rewards);
        accrual.transcoder_fees = Some(fees);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondline_types::{Regime, BASE_UNITS_PER_TOKEN as TOKEN};

    const HALF: u64 = 500_000;

    fn delegator(stake: Amount, checkpoint: Round) -> Delegator {
        Delegator {
            bonded_amount: stake,
            last_claim_round: checkpoint,
            ..Delegator::new(checkpoint)
        }
    }

    /// T self 1000, D 3000 from round 2; legacy rewards in rounds 2 and 3,
    /// cumulative from round 4.
    fn ledger() -> EarningsLedger {
        let mut ledger = EarningsLedger::new(HALF, HALF).expect("ledger");
        ledger.set_next_stake(1, 4000 * TOKEN);
        ledger
            .record_reward(2, 1000 * TOKEN, Regime::Legacy)
            .expect("round 2");
        ledger
            .record_reward(3, 1000 * TOKEN, Regime::Legacy)
            .expect("round 3");
        ledger
            .record_reward(4, 3000 * TOKEN, Regime::Cumulative)
            .expect("round 4");
        ledger
            .record_fee(4, 1200 * TOKEN, Regime::Cumulative)
            .expect("round 4 fee");
        ledger
    }

    fn projector(ledger: &EarningsLedger, max: u64) -> AccrualProjector<'_> {
        AccrualProjector::new(ledger, Some(4), max, SnapshotCutoverPolicy::default())
    }

    #[test]
    fn test_target_at_checkpoint_unchanged() {
        let ledger = ledger();
        let d = delegator(3000, 3);
        let accrual = projector(&ledger, 100).project(&d, false, 3).expect("project");
        assert_eq!(accrual, Accrual::unchanged(&d));
    }

    #[test]
    fn test_legacy_walk() {
        let ledger = ledger();
        let d = delegator(3000 * TOKEN, 1);
        let accrual = projector(&ledger, 100).project(&d, false, 3).expect("project");
        assert_eq!(accrual.stake, 37_125 * TOKEN / 10);
        assert_eq!(accrual.legacy_rounds_walked, 2);
    }

    #[test]
    fn test_legacy_then_cumulative() {
        let ledger = ledger();
        let d = delegator(3000 * TOKEN, 1);
        let accrual = projector(&ledger, 100).project(&d, false, 4).expect("project");
        // 3712.5 * 1.25 and 3712.5 * 0.1
        assert_eq!(accrual.stake, 4_640_625 * TOKEN / 1000);
        assert_eq!(accrual.fees, 37_125 * TOKEN / 100);
    }

    #[test]
    fn test_transcoder_legacy_share_includes_pool() {
        let ledger = ledger();
        let t = delegator(1000 * TOKEN, 1);
        let accrual = projector(&ledger, 100).project(&t, true, 2).expect("project");
        assert_eq!(accrual.stake, 1625 * TOKEN);
    }

    #[test]
    fn test_transcoder_cut_included_after_last_record() {
        let ledger = ledger();
        let t = delegator(2287 * TOKEN + TOKEN / 2, 3);
        let accrual = projector(&ledger, 100).project(&t, true, 4).expect("project");
        assert_eq!(accrual.transcoder_rewards, Some(1500 * TOKEN));
        assert_eq!(accrual.transcoder_fees, Some(600 * TOKEN));
        // 2287.5 * 1.25 + 1500
        assert_eq!(
            accrual.stake,
            2_859_375 * TOKEN / 1000 + 1500 * TOKEN
        );
    }

    #[test]
    fn test_too_many_rounds() {
        let ledger = ledger();
        let d = delegator(3000, 0);
        let err = projector(&ledger, 2).project(&d, false, 4).unwrap_err();
        assert_eq!(err, BondingError::TooManyRoundsToClaim { rounds: 4, max: 2 });
    }

    #[test]
    fn test_checkpoint_after_boundary_skips_walk() {
        let ledger = ledger();
        let d = delegator(3000, 4);
        let accrual = projector(&ledger, 0).project(&d, false, 9).expect("project");
        assert_eq!(accrual.legacy_rounds_walked, 0);
        assert_eq!(accrual.stake, 3000);
    }

    #[test]
    fn test_reference_policy_projects_snapshot_from_boundary_base() {
        let ledger = ledger();
        let mut d = delegator(1000, 4);
        d.checkpoint_source = CheckpointSource::Snapshot {
            identifier: "s".to_string(),
        };

        let reference =
            AccrualProjector::new(&ledger, Some(4), 100, SnapshotCutoverPolicy::Reference);
        let exclude = AccrualProjector::new(
            &ledger,
            Some(4),
            100,
            SnapshotCutoverPolicy::ExcludeCoveredRounds,
        );
        let target = 5;
        assert_eq!(reference.project(&d, false, target).expect("reference").stake, 1250);
        assert_eq!(exclude.project(&d, false, target).expect("exclude").stake, 1000);
    }
}
