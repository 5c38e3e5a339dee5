//! Flash-Mint DEX Adapter
//!
//! Exchange router abstraction used by both swap legs of a leveraged
//! issuance or redemption.
//!
//! ## Modules
//!
//! - **Swap Data**: the flat `SwapData` wire descriptor and its typed `SwapRoute`
//! - **Venues**: one trait per exchange kind
//! - **Adapter**: `DexAdapter`, executing a route with measured bounds
//! - **Reference venues**: constant-product, concentrated-liquidity and
//!   stable-swap routers over the shared ledger

#![allow(clippy::too_many_arguments)]

pub mod swap_data;
pub mod venues;
pub mod adapter;
pub mod constant_product;
pub mod concentrated;
pub mod stable_swap;

pub use swap_data::{same_asset, ConstantProductVenue, Exchange, SwapData, SwapRoute};
pub use venues::{
    ConcentratedLiquidityRouter, ConstantProductRouter, ExactInputParams, ExactOutputParams, StableSwapRegistry,
};
pub use adapter::{ensure_allowance, DexAdapter, SwapRouters, SwapSide};
pub use constant_product::UniswapV2Router;
pub use concentrated::UniswapV3Router;
pub use stable_swap::{CurveRegistry, StablePool};
