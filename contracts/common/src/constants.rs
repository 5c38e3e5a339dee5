//! Protocol Constants
//!
//! Fixed-point scales, fee denominators and well-known sentinels shared by
//! the exchange issuance contracts and their reference collaborators.

/// Fixed-point precision
pub mod precision {
    /// 1e18, the scale of per-unit position values
    pub const PRECISE_UNIT: u128 = 1_000_000_000_000_000_000;

    /// Half of `PRECISE_UNIT`, used for round-half-up helpers
    pub const HALF_PRECISE_UNIT: u128 = PRECISE_UNIT / 2;
}

/// Fee Configuration
pub mod fees {
    /// Basis points denominator
    pub const BPS_DENOMINATOR: u128 = 10_000;

    /// Aave V2 flash loan premium (0.09%)
    pub const FLASH_LOAN_PREMIUM_BPS: u128 = 9;

    /// Constant-product swap fee (0.30%)
    pub const CONSTANT_PRODUCT_FEE_BPS: u128 = 30;

    /// Concentrated-liquidity fee denominator (fee tiers are in hundredths of a bip)
    pub const FEE_TIER_DENOMINATOR: u128 = 1_000_000;

    /// Stable-swap fee denominator (Curve convention)
    pub const STABLE_SWAP_FEE_DENOMINATOR: u128 = 10_000_000_000;
}

/// Concentrated-liquidity fee tiers, in hundredths of a bip
pub mod fee_tiers {
    /// 0.01%
    pub const LOWEST: u32 = 100;
    /// 0.05%
    pub const LOW: u32 = 500;
    /// 0.30%
    pub const MEDIUM: u32 = 3_000;
    /// 1.00%
    pub const HIGH: u32 = 10_000;

    /// All tiers a concentrated-liquidity pool may be created with
    pub const SUPPORTED: [u32; 4] = [LOWEST, LOW, MEDIUM, HIGH];
}

/// Token amounts
pub mod token {
    /// Allowance value treated as infinite (never decremented)
    pub const MAX_ALLOWANCE: u128 = u128::MAX;

    /// One whole token with 18 decimals
    pub const ONE: u128 = crate::constants::precision::PRECISE_UNIT;
}

/// Stable-swap solver limits
pub mod stable_swap {
    /// Number of coins in every reference pool
    pub const N_COINS: usize = 2;

    /// Newton iteration cap for the invariant and balance solvers
    pub const MAX_ITERATIONS: usize = 255;
}

/// Flash loan modes accepted by the lending pool
pub mod flash_loan {
    /// Repay within the same call, no debt position is opened
    pub const MODE_NO_DEBT: u8 = 0;
}
