//! Constant-Product Router
//!
//! Uniswap-V2 style pairs. A pair's reserves are simply its ledger balances,
//! so liquidity added by a plain transfer is immediately tradable.
//!
//! ## Pricing
//!
//! `out = in * (10000 - fee) * r_out / (r_in * 10000 + in * (10000 - fee))`
//! and the inverse rounds the required input up by one unit.

use std::collections::BTreeMap;

use ethnum::U256;
use tracing::debug;

use flashmint_common::constants::fees::{BPS_DENOMINATOR, CONSTANT_PRODUCT_FEE_BPS};
use flashmint_common::errors::{FlashMintError, FlashMintResult};
use flashmint_common::ledger::Ledger;
use flashmint_common::math::to_amount;
use flashmint_common::types::{Address, Amount};

use crate::venues::{settle_hops, ConstantProductRouter};

// ============ Pricing ============

/// Output for selling `amount_in` into a pair with the given reserves
pub fn get_amount_out(
    pool: Address,
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u128,
) -> FlashMintResult<Amount> {
    if amount_in == 0 {
        return Err(FlashMintError::ZeroAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(FlashMintError::InsufficientLiquidity { pool });
    }
    let amount_in_with_fee = U256::from(amount_in) * U256::from(BPS_DENOMINATOR - fee_bps);
    let numerator = amount_in_with_fee * U256::from(reserve_out);
    let denominator = U256::from(reserve_in) * U256::from(BPS_DENOMINATOR) + amount_in_with_fee;
    to_amount(numerator / denominator)
}

/// Input needed to buy exactly `amount_out` from a pair with the given reserves
pub fn get_amount_in(
    pool: Address,
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u128,
) -> FlashMintResult<Amount> {
    if amount_out == 0 {
        return Err(FlashMintError::ZeroAmount);
    }
    if reserve_in == 0 || amount_out >= reserve_out {
        return Err(FlashMintError::InsufficientLiquidity { pool });
    }
    let numerator = U256::from(reserve_in) * U256::from(amount_out) * U256::from(BPS_DENOMINATOR);
    let denominator = U256::from(reserve_out - amount_out) * U256::from(BPS_DENOMINATOR - fee_bps);
    to_amount(numerator / denominator + U256::ONE)
}

// ============ Router ============

/// Router and factory for constant-product pairs
#[derive(Debug, Clone)]
pub struct UniswapV2Router {
    address: Address,
    factory: Address,
    fee_bps: u128,
    /// Sorted token pair -> pair address
    pairs: BTreeMap<(Address, Address), Address>,
}

fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl UniswapV2Router {
    pub fn new(address: Address, factory: Address) -> Self {
        Self {
            address,
            factory,
            fee_bps: CONSTANT_PRODUCT_FEE_BPS,
            pairs: BTreeMap::new(),
        }
    }

    /// Overrides the 30 bps default swap fee
    pub fn with_fee_bps(mut self, fee_bps: u128) -> Self {
        self.fee_bps = fee_bps;
        self
    }

    /// Registers the pair for two tokens, returning its address
    pub fn create_pair(&mut self, token_a: Address, token_b: Address) -> FlashMintResult<Address> {
        if token_a == token_b {
            return Err(FlashMintError::InvalidInput {
                param: "token_b",
                reason: "IDENTICAL_ADDRESSES",
            });
        }
        if token_a.is_zero() || token_b.is_zero() {
            return Err(FlashMintError::InvalidAddress { reason: "pair token cannot be zero" });
        }
        let key = sort_tokens(token_a, token_b);
        let factory = self.factory;
        let pair = *self.pairs.entry(key).or_insert_with(|| {
            Address::derive_from(&[factory.as_bytes(), key.0.as_bytes(), key.1.as_bytes()])
        });
        Ok(pair)
    }

    pub fn pair_for(&self, token_a: Address, token_b: Address) -> FlashMintResult<Address> {
        self.pairs
            .get(&sort_tokens(token_a, token_b))
            .copied()
            .ok_or(FlashMintError::PoolNotFound {
                token_in: token_a,
                token_out: token_b,
            })
    }

    /// Reserves of `token_a` and `token_b`, in argument order
    pub fn get_reserves(&self, ledger: &Ledger, token_a: Address, token_b: Address) -> FlashMintResult<(Amount, Amount)> {
        let pair = self.pair_for(token_a, token_b)?;
        Ok((ledger.balance_of(token_a, pair), ledger.balance_of(token_b, pair)))
    }

    /// Seeds a pair with `provider`'s tokens
    pub fn add_liquidity(
        &self,
        ledger: &mut Ledger,
        provider: Address,
        token_a: Address,
        token_b: Address,
        amount_a: Amount,
        amount_b: Amount,
    ) -> FlashMintResult<()> {
        let pair = self.pair_for(token_a, token_b)?;
        ledger.transfer(token_a, provider, pair, amount_a)?;
        ledger.transfer(token_b, provider, pair, amount_b)?;
        Ok(())
    }

    fn pairs_along(&self, path: &[Address]) -> FlashMintResult<Vec<Address>> {
        if path.len() < 2 {
            return Err(FlashMintError::InvalidInput {
                param: "path",
                reason: "INVALID_PATH",
            });
        }
        path.windows(2).map(|hop| self.pair_for(hop[0], hop[1])).collect()
    }
}

impl ConstantProductRouter for UniswapV2Router {
    fn address(&self) -> Address {
        self.address
    }

    fn get_amounts_out(&self, ledger: &Ledger, amount_in: Amount, path: &[Address]) -> FlashMintResult<Vec<Amount>> {
        let pairs = self.pairs_along(path)?;
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for (hop, pair) in pairs.iter().enumerate() {
            let reserve_in = ledger.balance_of(path[hop], *pair);
            let reserve_out = ledger.balance_of(path[hop + 1], *pair);
            let out = get_amount_out(*pair, amounts[hop], reserve_in, reserve_out, self.fee_bps)?;
            amounts.push(out);
        }
        Ok(amounts)
    }

    fn get_amounts_in(&self, ledger: &Ledger, amount_out: Amount, path: &[Address]) -> FlashMintResult<Vec<Amount>> {
        let pairs = self.pairs_along(path)?;
        let mut amounts = vec![0; path.len()];
        amounts[path.len() - 1] = amount_out;
        for hop in (0..pairs.len()).rev() {
            let pair = pairs[hop];
            let reserve_in = ledger.balance_of(path[hop], pair);
            let reserve_out = ledger.balance_of(path[hop + 1], pair);
            amounts[hop] = get_amount_in(pair, amounts[hop + 1], reserve_in, reserve_out, self.fee_bps)?;
        }
        Ok(amounts)
    }

    fn swap_exact_tokens_for_tokens(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[Address],
        to: Address,
    ) -> FlashMintResult<Vec<Amount>> {
        let amounts = self.get_amounts_out(ledger, amount_in, path)?;
        let amount_out = amounts[amounts.len() - 1];
        if amount_out < amount_out_min {
            return Err(FlashMintError::InsufficientSwapOutput {
                amount_out,
                min_out: amount_out_min,
            });
        }
        let pairs = self.pairs_along(path)?;
        settle_hops(ledger, self.address, caller, &pairs, path, &amounts, to)?;
        debug!(router = %self.address, amount_in, amount_out, hops = pairs.len(), "v2 exact input swap");
        Ok(amounts)
    }

    fn swap_tokens_for_exact_tokens(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        amount_out: Amount,
        amount_in_max: Amount,
        path: &[Address],
        to: Address,
    ) -> FlashMintResult<Vec<Amount>> {
        let amounts = self.get_amounts_in(ledger, amount_out, path)?;
        if amounts[0] > amount_in_max {
            return Err(FlashMintError::ExcessiveSwapInput {
                amount_in: amounts[0],
                max_in: amount_in_max,
            });
        }
        let pairs = self.pairs_along(path)?;
        settle_hops(ledger, self.address, caller, &pairs, path, &amounts, to)?;
        debug!(router = %self.address, amount_in = amounts[0], amount_out, hops = pairs.len(), "v2 exact output swap");
        Ok(amounts)
    }
}
