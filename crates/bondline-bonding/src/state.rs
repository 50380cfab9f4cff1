//! Persistent delegator and transcoder records.

use std::collections::{BTreeMap, BTreeSet};

use bondline_earnings::ledger::EarningsLedger;
use bondline_types::{Address, Amount, Round};
use serde::{Deserialize, Serialize};

/// Where a delegator's current checkpoint came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Computed by a claim (or by bonding).
    #[default]
    Claim,
    /// Taken from a snapshot leaf.
    Snapshot { identifier: String },
}

/// Stake waiting out the unbonding period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingLock {
    pub amount: Amount,
    /// First round in which the lock can be withdrawn.
    pub withdraw_round: Round,
}

/// A delegator. A transcoder is also a delegator bonded to itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegator {
    pub delegate: Option<Address>,
    /// Stake as of `last_claim_round`.
    pub bonded_amount: Amount,
    /// Realized, unwithdrawn fees as of `last_claim_round`.
    pub fees: Amount,
    /// First round in which the current bond counts toward the delegate's stake.
    pub start_round: Round,
    /// Checkpoint round. Never decreases, never exceeds the current round.
    pub last_claim_round: Round,
    pub checkpoint_source: CheckpointSource,
    pub unbonding_locks: BTreeMap<u64, UnbondingLock>,
    pub claim_proxies: BTreeSet<Address>,
}

impl Delegator {
    /// A fresh delegator checkpointed at `round`.
    pub fn new(round: Round) -> Self {
        Self {
            last_claim_round: round,
            ..Default::default()
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.delegate.is_some()
    }

    /// Unbonded with nothing left to withdraw. Such a record can be dropped.
    pub fn is_empty(&self) -> bool {
        self.delegate.is_none()
            && self.bonded_amount == 0
            && self.fees == 0
            && self.unbonding_locks.is_empty()
    }

    /// Whether `caller` may claim on behalf of this delegator.
    pub fn may_claim(&self, owner: Address, caller: Address) -> bool {
        caller == owner || self.claim_proxies.contains(&caller)
    }
}

/// A registered transcoder and its earnings ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcoder {
    pub address: Address,
    pub registered_round: Round,
    pub ledger: EarningsLedger,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_delegator() {
        let d = Delegator::new(4);
        assert_eq!(d.last_claim_round, 4);
        assert!(!d.is_bonded());
        assert_eq!(d.checkpoint_source, CheckpointSource::Claim);
    }

    #[test]
    fn test_may_claim() {
        let owner = Address::repeat_byte(1);
        let proxy = Address::repeat_byte(2);
        let mut d = Delegator::new(1);
        assert!(d.may_claim(owner, owner));
        assert!(!d.may_claim(owner, proxy));
        d.claim_proxies.insert(proxy);
        assert!(d.may_claim(owner, proxy));
    }

    #[test]
    fn test_checkpoint_source_serde() {
        let source = CheckpointSource::Snapshot {
            identifier: "migration-1".to_string(),
        };
        let json = serde_json::to_value(&source).expect("serialize");
        assert_eq!(json["kind"], "snapshot");
        assert_eq!(json["identifier"], "migration-1");
    }
}
