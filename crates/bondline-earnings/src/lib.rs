//! # bondline-earnings
//!
//! Per-transcoder earnings ledger.
//!
//! Each transcoder owns one [`ledger::EarningsLedger`] holding an
//! [`pool::EarningsPool`] entry per round in which it recorded rewards or
//! fees. Under the legacy regime an entry stores the round's pools and the
//! stake they are split over; under the cumulative regime it stores running
//! reward and fee factors so that any delegator's accrual between two rounds is
//! a single ratio, independent of how many delegators exist.
//!
//! ## Modules
//!
//! - [`pool`]: Per-round earnings pool entry
//! - [`factors`]: Ordered factor index with nearest-prior lookup
//! - [`ledger`]: Recording rewards and fees, stake checkpoints

pub mod factors;
pub mod ledger;
pub mod pool;

use std::fmt;

use bondline_types::Round;
use serde::{Deserialize, Serialize};

/// What a ledger entry records. Each kind may be recorded once per round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Reward,
    Fee,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reward => f.write_str("reward"),
            Self::Fee => f.write_str("fee"),
        }
    }
}

/// Error types for earnings ledger operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EarningsError {
    /// Rewards (or fees) were already recorded for this round.
    #[error("{kind} already recorded for round {round}")]
    AlreadyRecordedThisRound {
        /// Which kind of record was repeated.
        kind: RecordKind,
        /// The round.
        round: Round,
    },

    /// The transcoder has no stake active in this round.
    #[error("no active stake in round {round}")]
    NoActiveStake {
        /// The round.
        round: Round,
    },

    /// Arithmetic failure.
    #[error(transparent)]
    Math(#[from] bondline_math::MathError),
}

/// Convenience result type for earnings operations.
pub type Result<T> = std::result::Result<T, EarningsError>;
