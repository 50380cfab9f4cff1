//! # bondline-math
//!
//! Fixed-point arithmetic for the accounting engine.
//!
//! Two scales are in use:
//!
//! - **Percentages** (`reward_cut`, `fee_share`) are parts-per-million, see
//!   [`PERC_DIVISOR`].
//! - **Cumulative factors** are expressed in base 10^27, see
//!   [`precise::PRECISE_PERC_DIVISOR`].
//!
//! Every `a * b / c` goes through [`mul_div`], which widens to an arbitrary
//! precision integer so the intermediate product never overflows. Results
//! round down.

pub mod precise;

use bondline_types::Amount;
use num::{BigUint, ToPrimitive, Zero};

/// Denominator of a ppm percentage. `1_000_000` is 100%.
pub const PERC_DIVISOR: u64 = 1_000_000;

/// Error types for fixed-point arithmetic.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("invalid percentage {value} (max {PERC_DIVISOR})")]
    InvalidPercentage { value: u64 },
}

pub type Result<T> = std::result::Result<T, MathError>;

/// `a * b / c`, rounded down, without intermediate overflow.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `c` is zero
/// - [`MathError::Overflow`] if the quotient does not fit in an [`Amount`]
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Result<Amount> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let product = BigUint::from(a) * BigUint::from(b);
    let quotient = product / BigUint::from(c);
    if quotient.is_zero() {
        return Ok(0);
    }
    quotient.to_u128().ok_or(MathError::Overflow)
}

/// Whether `value` is a valid ppm percentage.
pub fn valid_perc(value: u64) -> bool {
    value <= PERC_DIVISOR
}

/// Reject percentages above 100%.
pub fn check_perc(value: u64) -> Result<u64> {
    if valid_perc(value) {
        Ok(value)
    } else {
        Err(MathError::InvalidPercentage { value })
    }
}

/// `amount * ppm / PERC_DIVISOR`.
pub fn perc_of(amount: Amount, ppm: u64) -> Result<Amount> {
    mul_div(amount, Amount::from(ppm), Amount::from(PERC_DIVISOR))
}

pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(MathError::Overflow)
}
