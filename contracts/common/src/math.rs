//! Mathematical Utilities
//!
//! Checked arithmetic on `u128` amounts and 1e18 fixed-point helpers.
//! Products that can exceed 128 bits are widened to `U256` before dividing.

use ethnum::U256;

use crate::constants::{fees, precision::PRECISE_UNIT};
use crate::errors::{FlashMintError, FlashMintResult};
use crate::types::Amount;

/// Safe addition with overflow check
pub fn safe_add(a: Amount, b: Amount) -> FlashMintResult<Amount> {
    a.checked_add(b).ok_or(FlashMintError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: Amount, b: Amount) -> FlashMintResult<Amount> {
    a.checked_sub(b).ok_or(FlashMintError::Underflow)
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: Amount, b: Amount) -> FlashMintResult<Amount> {
    a.checked_mul(b).ok_or(FlashMintError::Overflow)
}

/// Safe division with zero check
pub fn safe_div(a: Amount, b: Amount) -> FlashMintResult<Amount> {
    a.checked_div(b).ok_or(FlashMintError::DivisionByZero)
}

/// Narrows a 256-bit intermediate back to an amount
pub fn to_amount(value: U256) -> FlashMintResult<Amount> {
    if value > U256::from(Amount::MAX) {
        return Err(FlashMintError::Overflow);
    }
    Ok(value.as_u128())
}

/// `a * b / denominator`, rounded down, with a 256-bit intermediate
pub fn mul_div(a: Amount, b: Amount, denominator: Amount) -> FlashMintResult<Amount> {
    if denominator == 0 {
        return Err(FlashMintError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    to_amount(product / U256::from(denominator))
}

/// `a * b / denominator`, rounded up, with a 256-bit intermediate
pub fn mul_div_ceil(a: Amount, b: Amount, denominator: Amount) -> FlashMintResult<Amount> {
    if denominator == 0 {
        return Err(FlashMintError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if product % denominator != U256::ZERO {
        quotient += U256::ONE;
    }
    to_amount(quotient)
}

/// Multiplies a quantity by a 1e18 per-unit value, rounding down
///
/// Matches `PreciseUnitMath.preciseMul`.
pub fn precise_mul(quantity: Amount, unit: Amount) -> FlashMintResult<Amount> {
    mul_div(quantity, unit, PRECISE_UNIT)
}

/// Multiplies a quantity by a 1e18 per-unit value, rounding up
///
/// Matches `PreciseUnitMath.preciseMulCeil`: zero if either side is zero.
pub fn precise_mul_ceil(quantity: Amount, unit: Amount) -> FlashMintResult<Amount> {
    if quantity == 0 || unit == 0 {
        return Ok(0);
    }
    mul_div_ceil(quantity, unit, PRECISE_UNIT)
}

/// Divides by a 1e18 per-unit value, rounding down
pub fn precise_div(amount: Amount, unit: Amount) -> FlashMintResult<Amount> {
    mul_div(amount, PRECISE_UNIT, unit)
}

/// Fee in basis points of `amount`, rounded down
pub fn calculate_bps(amount: Amount, bps: u128) -> FlashMintResult<Amount> {
    mul_div(amount, bps, fees::BPS_DENOMINATOR)
}

/// Flash loan premium owed on top of the borrowed `amount`
pub fn calculate_premium(amount: Amount, premium_bps: u128) -> FlashMintResult<Amount> {
    calculate_bps(amount, premium_bps)
}

/// Integer square root (floor) of a 256-bit value
pub fn isqrt(value: U256) -> U256 {
    if value < U256::from(2u8) {
        return value;
    }
    let mut x = value;
    let mut y = (x + U256::ONE) >> 1;
    while y < x {
        x = y;
        y = (x + value / x) >> 1;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ONE: Amount = PRECISE_UNIT;

    #[test]
    fn test_safe_ops() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert_eq!(safe_add(Amount::MAX, 1), Err(FlashMintError::Overflow));
        assert_eq!(safe_sub(1, 2), Err(FlashMintError::Underflow));
        assert_eq!(safe_mul(Amount::MAX, 2), Err(FlashMintError::Overflow));
        assert_eq!(safe_div(1, 0), Err(FlashMintError::DivisionByZero));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // (2^127 * 4) / 8 does not fit in u128 before the division
        let big = 1u128 << 127;
        assert_eq!(mul_div(big, 4, 8).unwrap(), big / 2);
        assert_eq!(mul_div(Amount::MAX, Amount::MAX, 1), Err(FlashMintError::Overflow));
        assert_eq!(mul_div(1, 1, 0), Err(FlashMintError::DivisionByZero));
    }

    #[test]
    fn test_precise_rounding() {
        // 1.5 units at 0.333... per unit
        let unit = ONE / 3;
        let quantity = ONE + ONE / 2;
        let down = precise_mul(quantity, unit).unwrap();
        let up = precise_mul_ceil(quantity, unit).unwrap();
        assert_eq!(up, down + 1);
        assert_eq!(precise_mul_ceil(0, unit).unwrap(), 0);
        assert_eq!(precise_mul(2 * ONE, 2 * ONE).unwrap(), 4 * ONE);
        assert_eq!(precise_div(4 * ONE, 2 * ONE).unwrap(), 2 * ONE);
    }

    #[test]
    fn test_premium() {
        // 9 bps on 1000 tokens
        assert_eq!(calculate_premium(1_000 * ONE, 9).unwrap(), 9 * ONE / 10);
        assert_eq!(calculate_premium(100, 9).unwrap(), 0);
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(U256::from(0u8)), U256::ZERO);
        assert_eq!(isqrt(U256::from(15u8)), U256::from(3u8));
        assert_eq!(isqrt(U256::from(16u8)), U256::from(4u8));
        let big = U256::from(ONE) * U256::from(ONE);
        assert_eq!(isqrt(big), U256::from(ONE));
    }

    proptest! {
        #[test]
        fn prop_ceil_is_floor_or_floor_plus_one(
            quantity in 0u128..1_000_000_000_000_000_000_000_000u128,
            unit in 0u128..10_000_000_000_000_000_000u128,
        ) {
            let down = precise_mul(quantity, unit).unwrap();
            let up = precise_mul_ceil(quantity, unit).unwrap();
            prop_assert!(up == down || up == down + 1);
        }

        #[test]
        fn prop_mul_div_matches_u128_when_no_overflow(
            a in 0u128..u64::MAX as u128,
            b in 0u128..u64::MAX as u128,
            d in 1u128..u64::MAX as u128,
        ) {
            prop_assert_eq!(mul_div(a, b, d).unwrap(), a * b / d);
        }
    }
}
