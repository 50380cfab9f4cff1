//! Accounting events for off-chain reconciliation.
//!
//! Every state transition of the engine that moves value or changes a
//! checkpoint emits one [`AccountingEvent`]. Indexers consume the stream as
//! tagged JSON objects; amounts are decimal strings since they exceed `u64`.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Address, Amount, Hash, Regime, Round};

/// Envelope for all emitted events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// Round in which the event was emitted.
    pub round: Round,
    pub event: AccountingEvent,
}

/// All accounting events.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AccountingEvent {
    TranscoderRegistered {
        transcoder: Address,
        reward_cut: u64,
        fee_share: u64,
    },
    TranscoderUpdated {
        transcoder: Address,
        reward_cut: u64,
        fee_share: u64,
    },
    Reward {
        transcoder: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        delegators_share: Amount,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        commission: Amount,
        regime: Regime,
    },
    FeesRecorded {
        transcoder: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        delegators_share: Amount,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        commission: Amount,
        regime: Regime,
    },
    /// Earnings realized into a delegator's balance, by claim or snapshot.
    EarningsClaimed {
        delegate: Address,
        delegator: Address,
        /// Realized stake delta.
        #[serde_as(as = "serde_with::DisplayFromStr")]
        rewards: Amount,
        /// Realized fee delta.
        #[serde_as(as = "serde_with::DisplayFromStr")]
        fees: Amount,
        previous_checkpoint: Round,
        new_checkpoint: Round,
        /// Snapshot identifier when realized through a Merkle snapshot claim.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<String>,
    },
    Bond {
        new_delegate: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_delegate: Option<Address>,
        delegator: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        additional_amount: Amount,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        bonded_amount: Amount,
    },
    Unbond {
        delegate: Address,
        delegator: Address,
        lock_id: u64,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
        withdraw_round: Round,
    },
    WithdrawStake {
        delegator: Address,
        lock_id: u64,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    WithdrawFees {
        delegator: Address,
        #[serde_as(as = "serde_with::DisplayFromStr")]
        amount: Amount,
    },
    ClaimProxyApproved {
        delegator: Address,
        proxy: Address,
    },
    RegimeBoundarySet {
        boundary: Round,
    },
    SnapshotRootPublished {
        identifier: String,
        #[serde_as(as = "serde_with::hex::Hex")]
        root: Hash,
        snapshot_round: Round,
    },
}

impl AccountingEvent {
    /// Event type name as it appears in the serialized `event_type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            AccountingEvent::TranscoderRegistered { .. } => "transcoder_registered",
            AccountingEvent::TranscoderUpdated { .. } => "transcoder_updated",
            AccountingEvent::Reward { .. } => "reward",
            AccountingEvent::FeesRecorded { .. } => "fees_recorded",
            AccountingEvent::EarningsClaimed { .. } => "earnings_claimed",
            AccountingEvent::Bond { .. } => "bond",
            AccountingEvent::Unbond { .. } => "unbond",
            AccountingEvent::WithdrawStake { .. } => "withdraw_stake",
            AccountingEvent::WithdrawFees { .. } => "withdraw_fees",
            AccountingEvent::ClaimProxyApproved { .. } => "claim_proxy_approved",
            AccountingEvent::RegimeBoundarySet { .. } => "regime_boundary_set",
            AccountingEvent::SnapshotRootPublished { .. } => "snapshot_root_published",
        }
    }

    /// Addresses the event concerns, used for subscription filtering.
    pub fn addresses(&self) -> Vec<Address> {
        match self {
            AccountingEvent::TranscoderRegistered { transcoder, .. }
            | AccountingEvent::TranscoderUpdated { transcoder, .. }
            | AccountingEvent::Reward { transcoder, .. }
            | AccountingEvent::FeesRecorded { transcoder, .. } => vec![*transcoder],
            AccountingEvent::EarningsClaimed {
                delegate, delegator, ..
            }
            | AccountingEvent::Unbond {
                delegate, delegator, ..
            } => vec![*delegate, *delegator],
            AccountingEvent::Bond {
                new_delegate,
                old_delegate,
                delegator,
                ..
            } => {
                let mut out = vec![*new_delegate, *delegator];
                out.extend(old_delegate.iter().copied());
                out
            }
            AccountingEvent::WithdrawStake { delegator, .. }
            | AccountingEvent::WithdrawFees { delegator, .. } => vec![*delegator],
            AccountingEvent::ClaimProxyApproved { delegator, proxy } => vec![*delegator, *proxy],
            AccountingEvent::RegimeBoundarySet { .. }
            | AccountingEvent::SnapshotRootPublished { .. } => Vec::new(),
        }
    }
}
