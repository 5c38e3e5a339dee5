//! Concentrated-Liquidity Router
//!
//! Uniswap-V3 style pools keyed by token pair and fee tier. Every reference
//! pool holds a single full-range position, for which the concentrated
//! liquidity invariant reduces to `x * y = L^2` over the pool's balances.
//! Fee tiers are in hundredths of a bip (`3000` = 0.30%).

use std::collections::BTreeMap;

use ethnum::U256;
use tracing::debug;

use flashmint_common::constants::fee_tiers;
use flashmint_common::constants::fees::FEE_TIER_DENOMINATOR;
use flashmint_common::errors::{FlashMintError, FlashMintResult};
use flashmint_common::ledger::Ledger;
use flashmint_common::math::{isqrt, mul_div, mul_div_ceil, to_amount};
use flashmint_common::types::{Address, Amount};

use crate::venues::{settle_hops, ConcentratedLiquidityRouter, ExactInputParams, ExactOutputParams};

// ============ Swap Math ============

/// Output of one full-range hop for `amount_in`, fee taken from the input
pub fn compute_swap_exact_in(
    pool: Address,
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee: u32,
) -> FlashMintResult<Amount> {
    if amount_in == 0 {
        return Err(FlashMintError::ZeroAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(FlashMintError::InsufficientLiquidity { pool });
    }
    let amount_less_fee = mul_div(amount_in, FEE_TIER_DENOMINATOR - fee as u128, FEE_TIER_DENOMINATOR)?;
    let numerator = U256::from(reserve_out) * U256::from(amount_less_fee);
    let denominator = U256::from(reserve_in) + U256::from(amount_less_fee);
    to_amount(numerator / denominator)
}

/// Input of one full-range hop that buys exactly `amount_out`
pub fn compute_swap_exact_out(
    pool: Address,
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee: u32,
) -> FlashMintResult<Amount> {
    if amount_out == 0 {
        return Err(FlashMintError::ZeroAmount);
    }
    if reserve_in == 0 || amount_out >= reserve_out {
        return Err(FlashMintError::InsufficientLiquidity { pool });
    }
    let amount_less_fee = mul_div_ceil(reserve_in, amount_out, reserve_out - amount_out)?;
    mul_div_ceil(amount_less_fee, FEE_TIER_DENOMINATOR, FEE_TIER_DENOMINATOR - fee as u128)
}

// ============ Router ============

/// Router and factory for fee-tiered pools
#[derive(Debug, Clone)]
pub struct UniswapV3Router {
    address: Address,
    factory: Address,
    /// (sorted pair, fee tier) -> pool address
    pools: BTreeMap<(Address, Address, u32), Address>,
}

fn pool_key(a: Address, b: Address, fee: u32) -> (Address, Address, u32) {
    if a < b {
        (a, b, fee)
    } else {
        (b, a, fee)
    }
}

impl UniswapV3Router {
    pub fn new(address: Address, factory: Address) -> Self {
        Self {
            address,
            factory,
            pools: BTreeMap::new(),
        }
    }

    /// Registers the pool for a pair at `fee`, returning its address
    pub fn create_pool(&mut self, token_a: Address, token_b: Address, fee: u32) -> FlashMintResult<Address> {
        if token_a == token_b || token_a.is_zero() || token_b.is_zero() {
            return Err(FlashMintError::InvalidInput {
                param: "token",
                reason: "pool tokens must be distinct and nonzero",
            });
        }
        if !fee_tiers::SUPPORTED.contains(&fee) {
            return Err(FlashMintError::InvalidInput {
                param: "fee",
                reason: "unsupported fee tier",
            });
        }
        let key = pool_key(token_a, token_b, fee);
        let factory = self.factory;
        let pool = *self.pools.entry(key).or_insert_with(|| {
            Address::derive_from(&[
                factory.as_bytes(),
                key.0.as_bytes(),
                key.1.as_bytes(),
                &fee.to_be_bytes(),
            ])
        });
        Ok(pool)
    }

    pub fn pool_for(&self, token_a: Address, token_b: Address, fee: u32) -> FlashMintResult<Address> {
        self.pools
            .get(&pool_key(token_a, token_b, fee))
            .copied()
            .ok_or(FlashMintError::PoolNotFound {
                token_in: token_a,
                token_out: token_b,
            })
    }

    /// Seeds a pool's full-range position with `provider`'s tokens
    pub fn add_liquidity(
        &self,
        ledger: &mut Ledger,
        provider: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
        amount_a: Amount,
        amount_b: Amount,
    ) -> FlashMintResult<()> {
        let pool = self.pool_for(token_a, token_b, fee)?;
        ledger.transfer(token_a, provider, pool, amount_a)?;
        ledger.transfer(token_b, provider, pool, amount_b)?;
        Ok(())
    }

    /// Active liquidity `L = sqrt(x * y)` of a pool
    pub fn liquidity(&self, ledger: &Ledger, token_a: Address, token_b: Address, fee: u32) -> FlashMintResult<Amount> {
        let pool = self.pool_for(token_a, token_b, fee)?;
        let product = U256::from(ledger.balance_of(token_a, pool)) * U256::from(ledger.balance_of(token_b, pool));
        to_amount(isqrt(product))
    }

    fn pools_along(&self, path: &[Address], fees: &[u32]) -> FlashMintResult<Vec<Address>> {
        if path.len() < 2 || fees.len() != path.len() - 1 {
            return Err(FlashMintError::InvalidInput {
                param: "fees",
                reason: "PATH_FEES_MISMATCH",
            });
        }
        path.windows(2)
            .zip(fees)
            .map(|(hop, fee)| self.pool_for(hop[0], hop[1], *fee))
            .collect()
    }

    fn amounts_out(&self, ledger: &Ledger, path: &[Address], fees: &[u32], amount_in: Amount) -> FlashMintResult<(Vec<Address>, Vec<Amount>)> {
        let pools = self.pools_along(path, fees)?;
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for (hop, pool) in pools.iter().enumerate() {
            let out = compute_swap_exact_in(
                *pool,
                amounts[hop],
                ledger.balance_of(path[hop], *pool),
                ledger.balance_of(path[hop + 1], *pool),
                fees[hop],
            )?;
            amounts.push(out);
        }
        Ok((pools, amounts))
    }

    fn amounts_in(&self, ledger: &Ledger, path: &[Address], fees: &[u32], amount_out: Amount) -> FlashMintResult<(Vec<Address>, Vec<Amount>)> {
        let pools = self.pools_along(path, fees)?;
        let mut amounts = vec![0; path.len()];
        amounts[path.len() - 1] = amount_out;
        for hop in (0..pools.len()).rev() {
            amounts[hop] = compute_swap_exact_out(
                pools[hop],
                amounts[hop + 1],
                ledger.balance_of(path[hop], pools[hop]),
                ledger.balance_of(path[hop + 1], pools[hop]),
                fees[hop],
            )?;
        }
        Ok((pools, amounts))
    }
}

impl ConcentratedLiquidityRouter for UniswapV3Router {
    fn address(&self) -> Address {
        self.address
    }

    fn quote_exact_input(&self, ledger: &Ledger, path: &[Address], fees: &[u32], amount_in: Amount) -> FlashMintResult<Amount> {
        let (_, amounts) = self.amounts_out(ledger, path, fees, amount_in)?;
        Ok(amounts[amounts.len() - 1])
    }

    fn quote_exact_output(&self, ledger: &Ledger, path: &[Address], fees: &[u32], amount_out: Amount) -> FlashMintResult<Amount> {
        let (_, amounts) = self.amounts_in(ledger, path, fees, amount_out)?;
        Ok(amounts[0])
    }

    fn exact_input(&self, ledger: &mut Ledger, caller: Address, params: ExactInputParams) -> FlashMintResult<Amount> {
        let (pools, amounts) = self.amounts_out(ledger, &params.path, &params.fees, params.amount_in)?;
        let amount_out = amounts[amounts.len() - 1];
        if amount_out < params.amount_out_minimum {
            return Err(FlashMintError::InsufficientSwapOutput {
                amount_out,
                min_out: params.amount_out_minimum,
            });
        }
        settle_hops(ledger, self.address, caller, &pools, &params.path, &amounts, params.recipient)?;
        debug!(router = %self.address, amount_in = params.amount_in, amount_out, "v3 exact input swap");
        Ok(amount_out)
    }

    fn exact_output(&self, ledger: &mut Ledger, caller: Address, params: ExactOutputParams) -> FlashMintResult<Amount> {
        let (pools, amounts) = self.amounts_in(ledger, &params.path, &params.fees, params.amount_out)?;
        let amount_in = amounts[0];
        if amount_in > params.amount_in_maximum {
            return Err(FlashMintError::ExcessiveSwapInput {
                amount_in,
                max_in: params.amount_in_maximum,
            });
        }
        settle_hops(ledger, self.address, caller, &pools, &params.path, &amounts, params.recipient)?;
        debug!(router = %self.address, amount_in, amount_out = params.amount_out, "v3 exact output swap");
        Ok(amount_in)
    }
}
