//! Stable-Swap Registry
//!
//! Curve-style two-coin pools. Prices follow the StableSwap invariant
//!
//! `A * n^n * sum(x) + D = A * D * n^n + D^(n+1) / (n^n * prod(x))`
//!
//! solved for `D` and for the post-trade balance by Newton iteration on
//! 256-bit intermediates. A coin may be native ETH, held by the pool under
//! the ETH sentinel.

use std::collections::BTreeMap;

use ethnum::U256;
use tracing::debug;

use flashmint_common::constants::fees::STABLE_SWAP_FEE_DENOMINATOR;
use flashmint_common::constants::stable_swap::{MAX_ITERATIONS, N_COINS};
use flashmint_common::errors::{FlashMintError, FlashMintResult};
use flashmint_common::ledger::Ledger;
use flashmint_common::math::{mul_div, mul_div_ceil, to_amount};
use flashmint_common::types::{Address, Amount};

use crate::venues::StableSwapRegistry;

/// Rounds `get_input_amount` may step up before giving up
const MAX_INPUT_ADJUSTMENTS: usize = 8;

// ============ Invariant Math ============

fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Invariant `D` for balances `xp` and `ann = A * n^n`
pub fn compute_d(xp: &[Amount; N_COINS], ann: u128) -> FlashMintResult<U256> {
    let n = U256::from(N_COINS as u128);
    let ann = U256::from(ann);
    let sum: U256 = xp.iter().map(|x| U256::from(*x)).sum();
    if sum == U256::ZERO {
        return Ok(U256::ZERO);
    }
    if xp.iter().any(|x| *x == 0) {
        return Err(FlashMintError::NoConvergence);
    }

    let mut d = sum;
    for _ in 0..MAX_ITERATIONS {
        let mut d_p = d;
        for x in xp {
            d_p = d_p * d / (U256::from(*x) * n);
        }
        let d_prev = d;
        let numerator = (ann * sum + d_p * n) * d;
        let denominator = (ann - U256::ONE) * d + (n + U256::ONE) * d_p;
        d = numerator / denominator;
        if abs_diff(d, d_prev) <= U256::ONE {
            return Ok(d);
        }
    }
    Err(FlashMintError::NoConvergence)
}

/// Balance of coin `j` that keeps `d` when coin `i` moves to `x`
pub fn get_y(i: usize, j: usize, x: Amount, xp: &[Amount; N_COINS], ann: u128, d: U256) -> FlashMintResult<U256> {
    if i == j || i >= N_COINS || j >= N_COINS {
        return Err(FlashMintError::InvalidInput {
            param: "coin index",
            reason: "indices must be distinct and in range",
        });
    }
    let n = U256::from(N_COINS as u128);
    let ann = U256::from(ann);

    let mut c = d;
    let mut sum = U256::ZERO;
    for (k, balance) in xp.iter().enumerate() {
        let x_k = if k == i {
            U256::from(x)
        } else if k != j {
            U256::from(*balance)
        } else {
            continue;
        };
        if x_k == U256::ZERO {
            return Err(FlashMintError::NoConvergence);
        }
        sum += x_k;
        c = c * d / (x_k * n);
    }
    c = c * d / (ann * n);
    let b = sum + d / ann;

    let mut y = d;
    for _ in 0..MAX_ITERATIONS {
        let y_prev = y;
        let denominator = U256::from(2u8) * y + b;
        if denominator <= d {
            return Err(FlashMintError::NoConvergence);
        }
        y = (y * y + c) / (denominator - d);
        if abs_diff(y, y_prev) <= U256::ONE {
            return Ok(y);
        }
    }
    Err(FlashMintError::NoConvergence)
}

// ============ Pools ============

/// Parameters of one stable-swap pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StablePool {
    pub coins: [Address; N_COINS],
    /// Amplification coefficient `A`
    pub amplification: u128,
    /// Swap fee in 1e10 units (4_000_000 = 0.04%)
    pub fee: u128,
}

impl StablePool {
    fn ann(&self) -> u128 {
        self.amplification * (N_COINS * N_COINS) as u128
    }

    /// Output of coin `j` for `dx` of coin `i`, fee deducted from the output
    pub fn get_dy(&self, pool: Address, balances: &[Amount; N_COINS], i: usize, j: usize, dx: Amount) -> FlashMintResult<Amount> {
        if dx == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        let d = compute_d(balances, self.ann())?;
        let x = balances[i].checked_add(dx).ok_or(FlashMintError::Overflow)?;
        let y = to_amount(get_y(i, j, x, balances, self.ann(), d)?)?;
        let dy = balances[j]
            .checked_sub(y)
            .and_then(|v| v.checked_sub(1))
            .ok_or(FlashMintError::InsufficientLiquidity { pool })?;
        let fee = mul_div(dy, self.fee, STABLE_SWAP_FEE_DENOMINATOR)?;
        Ok(dy - fee)
    }

    /// Smallest `dx` of coin `i` whose `get_dy` reaches `dy` of coin `j`
    pub fn get_dx(&self, pool: Address, balances: &[Amount; N_COINS], i: usize, j: usize, dy: Amount) -> FlashMintResult<Amount> {
        if dy == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        let dy_before_fee = mul_div_ceil(dy, STABLE_SWAP_FEE_DENOMINATOR, STABLE_SWAP_FEE_DENOMINATOR - self.fee)?;
        let y = balances[j]
            .checked_sub(dy_before_fee)
            .and_then(|v| v.checked_sub(1))
            .filter(|y| *y > 0)
            .ok_or(FlashMintError::InsufficientLiquidity { pool })?;
        let d = compute_d(balances, self.ann())?;
        let x = to_amount(get_y(j, i, y, balances, self.ann(), d)?)?;
        let mut dx = x
            .checked_sub(balances[i])
            .ok_or(FlashMintError::NoConvergence)?
            .saturating_add(1);

        let mut step: Amount = 1;
        for _ in 0..MAX_INPUT_ADJUSTMENTS {
            if self.get_dy(pool, balances, i, j, dx)? >= dy {
                return Ok(dx);
            }
            dx = dx.checked_add(step).ok_or(FlashMintError::Overflow)?;
            step *= 2;
        }
        Err(FlashMintError::NoConvergence)
    }
}

/// Registry and exchange router for stable-swap pools
#[derive(Debug, Clone)]
pub struct CurveRegistry {
    address: Address,
    pools: BTreeMap<Address, StablePool>,
}

impl CurveRegistry {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            pools: BTreeMap::new(),
        }
    }

    /// Registers a pool under `pool_address`
    pub fn add_pool(
        &mut self,
        pool_address: Address,
        coins: [Address; N_COINS],
        amplification: u128,
        fee: u128,
    ) -> FlashMintResult<()> {
        if pool_address.is_zero() || coins.iter().any(Address::is_zero) || coins[0] == coins[1] {
            return Err(FlashMintError::InvalidInput {
                param: "pool",
                reason: "pool and coins must be distinct and nonzero",
            });
        }
        if amplification == 0 || fee >= STABLE_SWAP_FEE_DENOMINATOR {
            return Err(FlashMintError::InvalidInput {
                param: "pool",
                reason: "amplification must be positive and fee below 100%",
            });
        }
        self.pools.insert(
            pool_address,
            StablePool {
                coins,
                amplification,
                fee,
            },
        );
        Ok(())
    }

    pub fn pool(&self, pool: Address) -> FlashMintResult<&StablePool> {
        self.pools.get(&pool).ok_or(FlashMintError::PoolNotFound {
            token_in: pool,
            token_out: pool,
        })
    }

    /// Current coin balances of a pool
    pub fn balances(&self, ledger: &Ledger, pool: Address) -> FlashMintResult<[Amount; N_COINS]> {
        let params = self.pool(pool)?;
        Ok([
            ledger.balance_of(params.coins[0], pool),
            ledger.balance_of(params.coins[1], pool),
        ])
    }

    /// Seeds a pool with `provider`'s coins
    pub fn add_liquidity(
        &self,
        ledger: &mut Ledger,
        provider: Address,
        pool: Address,
        amounts: [Amount; N_COINS],
    ) -> FlashMintResult<()> {
        let params = *self.pool(pool)?;
        for (coin, amount) in params.coins.iter().zip(amounts) {
            ledger.transfer(*coin, provider, pool, amount)?;
        }
        Ok(())
    }
}

impl StableSwapRegistry for CurveRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn coin_indices(&self, pool: Address, from: Address, to: Address) -> FlashMintResult<(usize, usize)> {
        let params = self.pool(pool)?;
        let index = |coin: Address| params.coins.iter().position(|c| *c == coin);
        match (index(from), index(to)) {
            (Some(i), Some(j)) if i != j => Ok((i, j)),
            _ => Err(FlashMintError::PoolNotFound {
                token_in: from,
                token_out: to,
            }),
        }
    }

    fn get_exchange_amount(&self, ledger: &Ledger, pool: Address, from: Address, to: Address, dx: Amount) -> FlashMintResult<Amount> {
        let (i, j) = self.coin_indices(pool, from, to)?;
        self.pool(pool)?.get_dy(pool, &self.balances(ledger, pool)?, i, j, dx)
    }

    fn get_input_amount(&self, ledger: &Ledger, pool: Address, from: Address, to: Address, dy: Amount) -> FlashMintResult<Amount> {
        let (i, j) = self.coin_indices(pool, from, to)?;
        self.pool(pool)?.get_dx(pool, &self.balances(ledger, pool)?, i, j, dy)
    }

    fn exchange(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        pool: Address,
        from: Address,
        to: Address,
        dx: Amount,
        min_dy: Amount,
        receiver: Address,
    ) -> FlashMintResult<Amount> {
        let dy = self.get_exchange_amount(ledger, pool, from, to, dx)?;
        if dy < min_dy {
            return Err(FlashMintError::InsufficientSwapOutput {
                amount_out: dy,
                min_out: min_dy,
            });
        }
        if from.is_native() {
            ledger.transfer(from, caller, pool, dx)?;
        } else {
            ledger.transfer_from(from, self.address, caller, pool, dx)?;
        }
        ledger.transfer(to, pool, receiver, dy)?;
        debug!(%pool, %from, %to, dx, dy, "stable swap exchange");
        Ok(dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashmint_common::constants::token::{MAX_ALLOWANCE, ONE};
    use flashmint_common::types::ETH_ADDRESS;

    fn steth() -> Address {
        Address::derive("steth")
    }

    fn pool_address() -> Address {
        Address::derive("steth-eth-pool")
    }

    fn trader() -> Address {
        Address::derive("trader")
    }

    fn setup() -> (CurveRegistry, Ledger) {
        let mut registry = CurveRegistry::new(Address::derive("curve-registry"));
        registry
            .add_pool(pool_address(), [ETH_ADDRESS, steth()], 100, 4_000_000)
            .unwrap();

        let lp = Address::derive("lp");
        let mut ledger = Ledger::new();
        ledger.mint(ETH_ADDRESS, lp, 10_000 * ONE).unwrap();
        ledger.mint(steth(), lp, 10_000 * ONE).unwrap();
        registry
            .add_liquidity(&mut ledger, lp, pool_address(), [10_000 * ONE, 10_000 * ONE])
            .unwrap();
        (registry, ledger)
    }

    #[test]
    fn test_d_of_balanced_pool_is_sum() {
        let d = compute_d(&[1_000 * ONE, 1_000 * ONE], 400).unwrap();
        let sum = U256::from(2_000 * ONE);
        assert!(abs_diff(d, sum) <= U256::ONE);
    }

    #[test]
    fn test_d_grows_with_reserves() {
        let small = compute_d(&[1_000 * ONE, 1_000 * ONE], 400).unwrap();
        let large = compute_d(&[2_000 * ONE, 2_000 * ONE], 400).unwrap();
        assert!(large > small);
    }

    #[test]
    fn test_stable_swap_beats_constant_product() {
        let (registry, ledger) = setup();
        let dy = registry
            .get_exchange_amount(&ledger, pool_address(), ETH_ADDRESS, steth(), 100 * ONE)
            .unwrap();
        // x*y=k with the same reserves would return ~99.0
        assert!(dy > 99 * ONE);
        assert!(dy < 100 * ONE);
    }

    #[test]
    fn test_get_input_amount_buys_at_least_target() {
        let (registry, ledger) = setup();
        let dx = registry
            .get_input_amount(&ledger, pool_address(), steth(), ETH_ADDRESS, 50 * ONE)
            .unwrap();
        let dy = registry
            .get_exchange_amount(&ledger, pool_address(), steth(), ETH_ADDRESS, dx)
            .unwrap();
        assert!(dy >= 50 * ONE);
        assert!(dx > 50 * ONE && dx < 51 * ONE);
    }

    #[test]
    fn test_exchange_native_in() {
        let (registry, mut ledger) = setup();
        ledger.mint(ETH_ADDRESS, trader(), 10 * ONE).unwrap();

        let dy = registry
            .exchange(&mut ledger, trader(), pool_address(), ETH_ADDRESS, steth(), 10 * ONE, 0, trader())
            .unwrap();

        assert_eq!(ledger.native_balance(trader()), 0);
        assert_eq!(ledger.balance_of(steth(), trader()), dy);
    }

    #[test]
    fn test_exchange_token_in_needs_allowance() {
        let (registry, mut ledger) = setup();
        ledger.mint(steth(), trader(), 10 * ONE).unwrap();
        let pool = pool_address();

        let err = registry
            .exchange(&mut ledger, trader(), pool, steth(), ETH_ADDRESS, ONE, 0, trader())
            .unwrap_err();
        assert!(matches!(err, FlashMintError::InsufficientAllowance { .. }));

        ledger.approve(steth(), trader(), registry.address(), MAX_ALLOWANCE);
        let dy = registry
            .exchange(&mut ledger, trader(), pool, steth(), ETH_ADDRESS, ONE, 0, trader())
            .unwrap();
        assert_eq!(ledger.native_balance(trader()), dy);
    }

    #[test]
    fn test_exchange_min_dy() {
        let (registry, mut ledger) = setup();
        ledger.mint(ETH_ADDRESS, trader(), ONE).unwrap();
        let err = registry
            .exchange(&mut ledger, trader(), pool_address(), ETH_ADDRESS, steth(), ONE, ONE, trader())
            .unwrap_err();
        assert!(matches!(err, FlashMintError::InsufficientSwapOutput { .. }));
    }

    #[test]
    fn test_unknown_coin() {
        let (registry, _) = setup();
        assert!(registry
            .coin_indices(pool_address(), steth(), Address::derive("dai"))
            .is_err());
    }
}
