//! Per-(transcoder, round) earnings pool entry.

use bondline_math::mul_div;
use bondline_types::Amount;
use serde::{Deserialize, Serialize};

use crate::{RecordKind, Result};

/// Earnings recorded by one transcoder in one round.
///
/// Legacy fields (`reward_pool` .. `transcoder_fee_pool`) are only populated
/// when `has_transcoder_reward_fee_pool` is set. Factor fields are zero when
/// the entry was populated under the legacy regime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsPool {
    /// Transcoder stake active in this round.
    pub total_stake: Amount,
    /// Stake the legacy pools are split over.
    pub claimable_stake: Amount,
    /// Reward cut (ppm) in effect when the entry was written.
    pub reward_cut: u64,
    /// Fee share (ppm) in effect when the entry was written.
    pub fee_share: u64,
    /// Rewards split over `claimable_stake` (legacy).
    pub reward_pool: Amount,
    /// Fees split over `claimable_stake` (legacy).
    pub fee_pool: Amount,
    /// Reward commission, claimed whole by the transcoder (legacy).
    pub transcoder_reward_pool: Amount,
    /// Fee commission, claimed whole by the transcoder (legacy).
    pub transcoder_fee_pool: Amount,
    /// Base 10^27 cumulative reward factor, zero when absent.
    pub cumulative_reward_factor: Amount,
    /// Base 10^27 cumulative fee factor, zero when absent.
    pub cumulative_fee_factor: Amount,
    /// Set when the entry was populated under the legacy regime.
    pub has_transcoder_reward_fee_pool: bool,
    /// A reward was recorded for this round.
    pub reward_recorded: bool,
    /// A fee was recorded for this round.
    pub fee_recorded: bool,
}

impl EarningsPool {
    /// Whether a record of `kind` has been written to this entry.
    pub fn is_recorded(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Reward => self.reward_recorded,
            RecordKind::Fee => self.fee_recorded,
        }
    }

    /// Legacy reward share for `stake`. The transcoder additionally takes the
    /// whole transcoder pool.
    pub fn reward_pool_share(&self, stake: Amount, is_transcoder: bool) -> Result<Amount> {
        let mut share = self.pool_share(self.reward_pool, stake)?;
        if is_transcoder {
            share = bondline_math::checked_add(share, self.transcoder_reward_pool)?;
        }
        Ok(share)
    }

    /// Legacy fee share for `stake`.
    pub fn fee_pool_share(&self, stake: Amount, is_transcoder: bool) -> Result<Amount> {
        let mut share = self.pool_share(self.fee_pool, stake)?;
        if is_transcoder {
            share = bondline_math::checked_add(share, self.transcoder_fee_pool)?;
        }
        Ok(share)
    }

    fn pool_share(&self, pool: Amount, stake: Amount) -> Result<Amount> {
        if self.claimable_stake == 0 {
            return Ok(0);
        }
        Ok(mul_div(pool, stake, self.claimable_stake)?)
    }
}
