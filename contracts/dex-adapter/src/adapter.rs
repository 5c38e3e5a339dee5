//! DEX Adapter
//!
//! Executes one validated swap leg on behalf of an `owner` account and
//! reports what actually moved. Every result is read from the owner's
//! balance deltas, never from a router's return value.
//!
//! ## Key Features
//!
//! - **Shape first**: a leg is parsed into a [`SwapRoute`] before any balance moves
//! - **No fallback**: an unconfigured venue is an error, not a reroute
//! - **Bounds re-checked**: min-out / max-in are enforced on measured deltas
//! - **WETH in, WETH out**: stable-swap legs on a native ETH coin are unwrapped
//!   before and wrapped after, so the owner only ever holds WETH

use std::sync::Arc;

use tracing::debug;

use flashmint_common::constants::token::MAX_ALLOWANCE;
use flashmint_common::errors::{FlashMintError, FlashMintResult};
use flashmint_common::interfaces::WrappedNative;
use flashmint_common::ledger::Ledger;
use flashmint_common::types::{Address, Amount};

use crate::swap_data::{ConstantProductVenue, Exchange, SwapData, SwapRoute};
use crate::venues::{
    ConcentratedLiquidityRouter, ConstantProductRouter, ExactInputParams, ExactOutputParams, StableSwapRegistry,
};

/// Which side of a swap is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSide {
    /// `amount` is sold, `bound` is the minimum bought
    ExactInput,
    /// `amount` is bought, `bound` is the maximum sold
    ExactOutput,
}

/// Router per venue; `None` leaves the venue disabled
#[derive(Clone, Default)]
pub struct SwapRouters {
    pub constant_product_a: Option<Arc<dyn ConstantProductRouter>>,
    pub constant_product_b: Option<Arc<dyn ConstantProductRouter>>,
    pub concentrated_liquidity: Option<Arc<dyn ConcentratedLiquidityRouter>>,
    pub stable_swap: Option<Arc<dyn StableSwapRegistry>>,
}

impl SwapRouters {
    /// Address of the router configured for `exchange`, if any
    pub fn router_address(&self, exchange: Exchange) -> Option<Address> {
        match exchange {
            Exchange::None => None,
            Exchange::ConstantProductA => self.constant_product_a.as_ref().map(|r| r.address()),
            Exchange::ConstantProductB => self.constant_product_b.as_ref().map(|r| r.address()),
            Exchange::ConcentratedLiquidity => self.concentrated_liquidity.as_ref().map(|r| r.address()),
            Exchange::StableSwap => self.stable_swap.as_ref().map(|r| r.address()),
        }
    }
}

/// Swap executor shared by both settlement legs
#[derive(Clone)]
pub struct DexAdapter {
    routers: SwapRouters,
    weth: Arc<dyn WrappedNative>,
}

fn not_configured(exchange: Exchange) -> FlashMintError {
    FlashMintError::RouterNotConfigured {
        exchange: exchange.name(),
    }
}

impl DexAdapter {
    pub fn new(routers: SwapRouters, weth: Arc<dyn WrappedNative>) -> Self {
        Self { routers, weth }
    }

    pub fn routers(&self) -> &SwapRouters {
        &self.routers
    }

    pub fn weth(&self) -> Address {
        self.weth.address()
    }

    pub fn wrapped_native(&self) -> &dyn WrappedNative {
        self.weth.as_ref()
    }

    // ============ Validation ============

    /// Parses `swap_data` and checks it converts `token_in` into `token_out`
    /// on a configured venue
    pub fn validate(&self, swap_data: &SwapData, token_in: Address, token_out: Address) -> FlashMintResult<SwapRoute> {
        let route = SwapRoute::try_from(swap_data)?;
        route.ensure_converts(token_in, token_out, self.weth())?;
        let exchange = route.exchange();
        if exchange != Exchange::None && self.routers.router_address(exchange).is_none() {
            return Err(not_configured(exchange));
        }
        Ok(route)
    }

    fn constant_product(&self, venue: ConstantProductVenue) -> FlashMintResult<&Arc<dyn ConstantProductRouter>> {
        let (router, exchange) = match venue {
            ConstantProductVenue::A => (&self.routers.constant_product_a, Exchange::ConstantProductA),
            ConstantProductVenue::B => (&self.routers.constant_product_b, Exchange::ConstantProductB),
        };
        router.as_ref().ok_or_else(|| not_configured(exchange))
    }

    fn concentrated(&self) -> FlashMintResult<&Arc<dyn ConcentratedLiquidityRouter>> {
        self.routers
            .concentrated_liquidity
            .as_ref()
            .ok_or_else(|| not_configured(Exchange::ConcentratedLiquidity))
    }

    fn stable(&self) -> FlashMintResult<&Arc<dyn StableSwapRegistry>> {
        self.routers
            .stable_swap
            .as_ref()
            .ok_or_else(|| not_configured(Exchange::StableSwap))
    }

    /// Asset the owner actually holds for a route endpoint
    fn held(&self, asset: Address) -> Address {
        if asset.is_native() {
            self.weth()
        } else {
            asset
        }
    }

    // ============ Execution ============

    /// Executes one leg and returns the measured amount
    ///
    /// Exact-input returns the amount received, exact-output the amount spent.
    pub fn resolve_and_swap(
        &self,
        ledger: &mut Ledger,
        owner: Address,
        swap_data: &SwapData,
        side: SwapSide,
        amount: Amount,
        bound: Amount,
    ) -> FlashMintResult<Amount> {
        let route = SwapRoute::try_from(swap_data)?;
        self.execute(ledger, owner, &route, side, amount, bound)
    }

    /// Executes an already validated route
    pub fn execute(
        &self,
        ledger: &mut Ledger,
        owner: Address,
        route: &SwapRoute,
        side: SwapSide,
        amount: Amount,
        bound: Amount,
    ) -> FlashMintResult<Amount> {
        let Some((token_in, token_out)) = route.endpoints() else {
            return check_bound(side, amount, amount, bound);
        };
        if amount == 0 {
            return check_bound(side, 0, 0, bound);
        }

        let held_in = self.held(token_in);
        let held_out = self.held(token_out);
        let in_before = ledger.balance_of(held_in, owner);
        let out_before = ledger.balance_of(held_out, owner);

        match route {
            SwapRoute::Identity { .. } => {}
            SwapRoute::ConstantProduct { venue, path } => {
                let router = self.constant_product(*venue)?;
                match side {
                    SwapSide::ExactInput => {
                        ensure_allowance(ledger, path[0], owner, router.address(), amount);
                        router.swap_exact_tokens_for_tokens(ledger, owner, amount, bound, path, owner)?;
                    }
                    SwapSide::ExactOutput => {
                        ensure_allowance(ledger, path[0], owner, router.address(), bound);
                        router.swap_tokens_for_exact_tokens(ledger, owner, amount, bound, path, owner)?;
                    }
                }
            }
            SwapRoute::ConcentratedLiquidity { path, fees } => {
                let router = self.concentrated()?;
                match side {
                    SwapSide::ExactInput => {
                        ensure_allowance(ledger, path[0], owner, router.address(), amount);
                        router.exact_input(
                            ledger,
                            owner,
                            ExactInputParams {
                                path: path.clone(),
                                fees: fees.clone(),
                                recipient: owner,
                                amount_in: amount,
                                amount_out_minimum: bound,
                            },
                        )?;
                    }
                    SwapSide::ExactOutput => {
                        ensure_allowance(ledger, path[0], owner, router.address(), bound);
                        router.exact_output(
                            ledger,
                            owner,
                            ExactOutputParams {
                                path: path.clone(),
                                fees: fees.clone(),
                                recipient: owner,
                                amount_out: amount,
                                amount_in_maximum: bound,
                            },
                        )?;
                    }
                }
            }
            SwapRoute::StableSwap { pool, token_in, token_out } => {
                self.swap_stable(ledger, owner, *pool, *token_in, *token_out, side, amount, bound)?;
            }
        }

        let spent = in_before.saturating_sub(ledger.balance_of(held_in, owner));
        let received = ledger
            .balance_of(held_out, owner)
            .checked_sub(out_before)
            .ok_or(FlashMintError::Underflow)?;
        debug!(
            exchange = route.exchange().name(),
            %token_in,
            %token_out,
            spent,
            received,
            "swap leg executed"
        );

        match side {
            SwapSide::ExactInput => check_bound(side, spent, received, bound),
            SwapSide::ExactOutput => {
                if received < amount {
                    return Err(FlashMintError::InsufficientSwapOutput {
                        amount_out: received,
                        min_out: amount,
                    });
                }
                check_bound(side, spent, received, bound)
            }
        }
    }

    fn swap_stable(
        &self,
        ledger: &mut Ledger,
        owner: Address,
        pool: Address,
        token_in: Address,
        token_out: Address,
        side: SwapSide,
        amount: Amount,
        bound: Amount,
    ) -> FlashMintResult<()> {
        let registry = self.stable()?;
        let (dx, min_dy) = match side {
            SwapSide::ExactInput => (amount, bound),
            SwapSide::ExactOutput => {
                let dx = registry.get_input_amount(ledger, pool, token_in, token_out, amount)?;
                // CURVE_OVERSPENT
                if dx > bound {
                    return Err(FlashMintError::ExcessiveSwapInput { amount_in: dx, max_in: bound });
                }
                (dx, amount)
            }
        };

        if token_in.is_native() {
            self.weth.withdraw(ledger, owner, dx)?;
        } else {
            ensure_allowance(ledger, token_in, owner, registry.address(), dx);
        }
        let dy = registry.exchange(ledger, owner, pool, token_in, token_out, dx, min_dy, owner)?;
        if token_out.is_native() {
            self.weth.deposit(ledger, owner, dy)?;
        }
        Ok(())
    }

    // ============ Quotes ============

    /// Estimated output for selling `amount_in` along the leg
    pub fn quote_exact_input(&self, ledger: &Ledger, swap_data: &SwapData, amount_in: Amount) -> FlashMintResult<Amount> {
        let route = SwapRoute::try_from(swap_data)?;
        if route.is_identity() || amount_in == 0 {
            return Ok(amount_in);
        }
        match &route {
            SwapRoute::Identity { .. } => Ok(amount_in),
            SwapRoute::ConstantProduct { venue, path } => {
                let amounts = self.constant_product(*venue)?.get_amounts_out(ledger, amount_in, path)?;
                amounts.last().copied().ok_or(FlashMintError::Underflow)
            }
            SwapRoute::ConcentratedLiquidity { path, fees } => {
                self.concentrated()?.quote_exact_input(ledger, path, fees, amount_in)
            }
            SwapRoute::StableSwap { pool, token_in, token_out } => {
                self.stable()?.get_exchange_amount(ledger, *pool, *token_in, *token_out, amount_in)
            }
        }
    }

    /// Estimated input for buying `amount_out` along the leg
    pub fn quote_exact_output(&self, ledger: &Ledger, swap_data: &SwapData, amount_out: Amount) -> FlashMintResult<Amount> {
        let route = SwapRoute::try_from(swap_data)?;
        if route.is_identity() || amount_out == 0 {
            return Ok(amount_out);
        }
        match &route {
            SwapRoute::Identity { .. } => Ok(amount_out),
            SwapRoute::ConstantProduct { venue, path } => {
                let amounts = self.constant_product(*venue)?.get_amounts_in(ledger, amount_out, path)?;
                amounts.first().copied().ok_or(FlashMintError::Underflow)
            }
            SwapRoute::ConcentratedLiquidity { path, fees } => {
                self.concentrated()?.quote_exact_output(ledger, path, fees, amount_out)
            }
            SwapRoute::StableSwap { pool, token_in, token_out } => {
                self.stable()?.get_input_amount(ledger, *pool, *token_in, *token_out, amount_out)
            }
        }
    }

    // ============ Convenience ============

    /// Sells exactly `amount_in`, returning the amount received
    pub fn swap_exact_tokens_for_tokens(
        &self,
        ledger: &mut Ledger,
        owner: Address,
        swap_data: &SwapData,
        amount_in: Amount,
        min_amount_out: Amount,
    ) -> FlashMintResult<Amount> {
        self.resolve_and_swap(ledger, owner, swap_data, SwapSide::ExactInput, amount_in, min_amount_out)
    }

    /// Buys exactly `amount_out`, returning the amount spent
    pub fn swap_tokens_for_exact_tokens(
        &self,
        ledger: &mut Ledger,
        owner: Address,
        swap_data: &SwapData,
        amount_out: Amount,
        max_amount_in: Amount,
    ) -> FlashMintResult<Amount> {
        self.resolve_and_swap(ledger, owner, swap_data, SwapSide::ExactOutput, amount_out, max_amount_in)
    }
}

fn check_bound(side: SwapSide, spent: Amount, received: Amount, bound: Amount) -> FlashMintResult<Amount> {
    match side {
        SwapSide::ExactInput if received < bound => Err(FlashMintError::InsufficientSwapOutput {
            amount_out: received,
            min_out: bound,
        }),
        SwapSide::ExactInput => Ok(received),
        SwapSide::ExactOutput if spent > bound => Err(FlashMintError::ExcessiveSwapInput {
            amount_in: spent,
            max_in: bound,
        }),
        SwapSide::ExactOutput => Ok(spent),
    }
}

/// Raises the owner's allowance to MAX when it does not cover `needed`
pub fn ensure_allowance(ledger: &mut Ledger, token: Address, owner: Address, spender: Address, needed: Amount) {
    if ledger.allowance(token, owner, spender) < needed {
        ledger.approve(token, owner, spender, MAX_ALLOWANCE);
    }
}
