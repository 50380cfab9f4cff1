//! Base 10^27 fixed point for cumulative factors.
//!
//! Factors are combined as `value * to / from` through [`crate::mul_div`].

use bondline_types::Amount;

/// Denominator of a precise percentage. A factor of exactly this value is 1.0.
pub const PRECISE_PERC_DIVISOR: Amount = 1_000_000_000_000_000_000_000_000_000;

/// The multiplicative identity for cumulative reward factors.
pub const UNIT_FACTOR: Amount = PRECISE_PERC_DIVISOR;
