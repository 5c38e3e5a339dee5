//! Venue Interfaces
//!
//! One trait per kind of exchange the adapter can route through. Routers
//! pull the sold asset from `caller` with `transfer_from`, so the caller
//! must have approved the router's address beforehand.

use flashmint_common::errors::FlashMintResult;
use flashmint_common::ledger::Ledger;
use flashmint_common::types::{Address, Amount};

/// Uniswap-V2 style router over constant-product pairs
pub trait ConstantProductRouter {
    fn address(&self) -> Address;

    /// Output of every hop for `amount_in` sold along `path`
    fn get_amounts_out(&self, ledger: &Ledger, amount_in: Amount, path: &[Address]) -> FlashMintResult<Vec<Amount>>;

    /// Input of every hop needed to buy `amount_out` at the end of `path`
    fn get_amounts_in(&self, ledger: &Ledger, amount_out: Amount, path: &[Address]) -> FlashMintResult<Vec<Amount>>;

    fn swap_exact_tokens_for_tokens(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[Address],
        to: Address,
    ) -> FlashMintResult<Vec<Amount>>;

    fn swap_tokens_for_exact_tokens(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        amount_out: Amount,
        amount_in_max: Amount,
        path: &[Address],
        to: Address,
    ) -> FlashMintResult<Vec<Amount>>;
}

/// Parameters of a concentrated-liquidity exact-input swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactInputParams {
    /// Assets in trade order
    pub path: Vec<Address>,
    /// Fee tier per hop
    pub fees: Vec<u32>,
    pub recipient: Address,
    pub amount_in: Amount,
    pub amount_out_minimum: Amount,
}

/// Parameters of a concentrated-liquidity exact-output swap
///
/// `path` is in trade order (sold asset first), unlike the reversed byte
/// encoding some routers use on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactOutputParams {
    pub path: Vec<Address>,
    pub fees: Vec<u32>,
    pub recipient: Address,
    pub amount_out: Amount,
    pub amount_in_maximum: Amount,
}

/// Uniswap-V3 style router over fee-tiered pools
pub trait ConcentratedLiquidityRouter {
    fn address(&self) -> Address;

    fn quote_exact_input(&self, ledger: &Ledger, path: &[Address], fees: &[u32], amount_in: Amount) -> FlashMintResult<Amount>;

    fn quote_exact_output(&self, ledger: &Ledger, path: &[Address], fees: &[u32], amount_out: Amount) -> FlashMintResult<Amount>;

    /// Returns the amount bought
    fn exact_input(&self, ledger: &mut Ledger, caller: Address, params: ExactInputParams) -> FlashMintResult<Amount>;

    /// Returns the amount sold
    fn exact_output(&self, ledger: &mut Ledger, caller: Address, params: ExactOutputParams) -> FlashMintResult<Amount>;
}

/// Curve-style registry of stable-swap pools
pub trait StableSwapRegistry {
    fn address(&self) -> Address;

    /// Coin indices of `from` and `to` in `pool`
    fn coin_indices(&self, pool: Address, from: Address, to: Address) -> FlashMintResult<(usize, usize)>;

    /// Amount of `to` received for `dx` of `from`
    fn get_exchange_amount(&self, ledger: &Ledger, pool: Address, from: Address, to: Address, dx: Amount) -> FlashMintResult<Amount>;

    /// Smallest amount of `from` that buys at least `dy` of `to`
    fn get_input_amount(&self, ledger: &Ledger, pool: Address, from: Address, to: Address, dy: Amount) -> FlashMintResult<Amount>;

    /// Sells `dx` of `from` for at least `min_dy` of `to`, paid to `receiver`
    ///
    /// A native ETH coin is taken from `caller`'s native balance.
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
    ) -> FlashMintResult<Amount>;
}

/// Moves a multi-hop trade through its pools
///
/// Pulls `amounts[0]` of `path[0]` from `caller` into the first pool, then
/// each pool pays its hop output to the next pool, the last one to `to`.
pub(crate) fn settle_hops(
    ledger: &mut Ledger,
    router: Address,
    caller: Address,
    pools: &[Address],
    path: &[Address],
    amounts: &[Amount],
    to: Address,
) -> FlashMintResult<()> {
    ledger.transfer_from(path[0], router, caller, pools[0], amounts[0])?;
    for (hop, pool) in pools.iter().enumerate() {
        let recipient = pools.get(hop + 1).copied().unwrap_or(to);
        ledger.transfer(path[hop + 1], *pool, recipient, amounts[hop + 1])?;
    }
    Ok(())
}
