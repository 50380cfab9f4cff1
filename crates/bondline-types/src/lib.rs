//! # bondline-types
//!
//! Shared domain types used across the Bondline workspace.
//!
//! ## Modules
//!
//! - [`address`]: 20-byte account identifiers for transcoders and delegators
//! - [`events`]: Accounting events consumed by off-chain indexers

pub mod address;
pub mod events;

pub use address::Address;

/// Accounting round number.
pub type Round = u64;

/// Token amount in base units.
pub type Amount = u128;

/// 32-byte hash (Merkle roots, leaves, siblings).
pub type Hash = [u8; 32];

/// Base units per whole token (18 decimals).
pub const BASE_UNITS_PER_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Accounting regime an earnings entry was populated under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Per-round pool shares, walked round by round at claim time.
    Legacy,
    /// Cumulative reward/fee factors, projected in O(1) at claim time.
    Cumulative,
}
