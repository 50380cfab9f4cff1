//! Reward minting.

use bondline_types::{Address, Amount};

/// Mints the reward a transcoder distributes when it calls reward.
pub trait Minter {
    /// Mint rewards for `transcoder`, whose active stake is `active_stake`.
    fn mint_rewards(&mut self, transcoder: Address, active_stake: Amount) -> Amount;
}

/// Mints the same amount on every call.
#[derive(Clone, Debug, Default)]
pub struct FixedMinter {
    per_call: Amount,
    total_minted: Amount,
}

impl FixedMinter {
    pub fn new(per_call: Amount) -> Self {
        Self {
            per_call,
            total_minted: 0,
        }
    }

    pub fn total_minted(&self) -> Amount {
        self.total_minted
    }
}

impl Minter for FixedMinter {
    fn mint_rewards(&mut self, transcoder: Address, active_stake: Amount) -> Amount {
        self.total_minted = self.total_minted.saturating_add(self.per_call);
        tracing::trace!(%transcoder, active_stake, minted = self.per_call, "minted rewards");
        self.per_call
    }
}
