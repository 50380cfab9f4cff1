//! # bondline-bonding
//!
//! Delegator and transcoder state, accrual projection and claims.
//!
//! [`manager::BondingManager`] owns every transcoder's earnings ledger and
//! every delegator's checkpoint. Delegators realize accrued stake and fees
//! with a claim, which projects their balance from the last checkpoint to a
//! target round with [`projector::AccrualProjector`]: round by round over
//! legacy entries, then as a single factor ratio over cumulative rounds.
//!
//! ## Modules
//!
//! - [`config`]: Engine configuration and the snapshot cut-over policy
//! - [`rounds`]: `RoundsManager` collaborator and a manual implementation
//! - [`minter`]: `Minter` collaborator and a fixed-amount implementation
//! - [`state`]: Delegator, transcoder and unbonding lock records
//! - [`projector`]: Pending stake and fee projection
//! - [`manager`]: Engine state, regime boundary, ledger commands, event outbox
//! - [`claims`]: Claim planning and realization
//! - [`bonding`]: Registration, bond, unbond, withdrawals

pub mod bonding;
pub mod claims;
pub mod config;
pub mod manager;
pub mod minter;
pub mod projector;
pub mod rounds;
pub mod state;

use bondline_types::{Address, Amount, Round};

pub use config::{BondingConfig, SnapshotCutoverPolicy};
pub use manager::{BondingManager, LedgerCommand};

/// Error types for bonding and claim operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BondingError {
    #[error(transparent)]
    Earnings(#[from] bondline_earnings::EarningsError),

    #[error(transparent)]
    Math(#[from] bondline_math::MathError),

    /// The legacy walk would exceed the configured bound.
    #[error("claim spans {rounds} legacy rounds, at most {max} allowed per claim")]
    TooManyRoundsToClaim { rounds: u64, max: u64 },

    #[error("round {requested} is after the current round {current}")]
    FutureRound { requested: Round, current: Round },

    #[error("round {requested} is before the checkpoint round {checkpoint}")]
    StaleRound { requested: Round, checkpoint: Round },

    #[error("round {round} is not initialized")]
    RoundNotInitialized { round: Round },

    #[error("unknown transcoder {0}")]
    UnknownTranscoder(Address),

    #[error("transcoder {0} is already registered")]
    TranscoderAlreadyRegistered(Address),

    #[error("unknown delegator {0}")]
    UnknownDelegator(Address),

    /// Caller is neither the account owner, an approved proxy, nor the governor.
    #[error("{caller} is not authorized for this action")]
    Unauthorized { caller: Address },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("insufficient bonded stake: requested {requested}, bonded {bonded}")]
    InsufficientStake { requested: Amount, bonded: Amount },

    #[error("delegator {0} is not bonded")]
    NotBonded(Address),

    #[error("regime boundary already set at round {0}")]
    BoundaryAlreadySet(Round),

    #[error("regime boundary {requested} is before the current round {current}")]
    BoundaryInPast { requested: Round, current: Round },

    #[error("unbonding lock {0} not found")]
    LockNotFound(u64),

    #[error("unbonding lock {lock_id} is withdrawable from round {withdraw_round}")]
    LockNotWithdrawable { lock_id: u64, withdraw_round: Round },

    #[error("no fees to withdraw")]
    NoFees,
}

/// Convenience result type for bonding operations.
pub type Result<T> = std::result::Result<T, BondingError>;
