//! Swap Descriptors
//!
//! `SwapData` is the flat wire form a caller submits for one swap leg.
//! `SwapRoute` is the validated, typed form: each variant carries only the
//! fields its venue reads, so a leg that passed `SwapRoute::try_from` can be
//! dispatched by an exhaustive match without re-checking its shape.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use flashmint_common::errors::{FlashMintError, FlashMintResult};
use flashmint_common::types::Address;

// ============ Exchange Tag ============

/// Venue selected by a swap leg
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum Exchange {
    /// No swap, the leg's input already is its output
    #[default]
    None = 0,
    /// First constant-product router
    ConstantProductA = 1,
    /// Second constant-product router
    ConstantProductB = 2,
    /// Concentrated-liquidity router with per-hop fee tiers
    ConcentratedLiquidity = 3,
    /// Stable-swap pool addressed through the registry
    StableSwap = 4,
}

impl Exchange {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::ConstantProductA => "ConstantProductA",
            Self::ConstantProductB => "ConstantProductB",
            Self::ConcentratedLiquidity => "ConcentratedLiquidity",
            Self::StableSwap => "StableSwap",
        }
    }
}

impl TryFrom<u8> for Exchange {
    type Error = FlashMintError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::ConstantProductA),
            2 => Ok(Self::ConstantProductB),
            3 => Ok(Self::ConcentratedLiquidity),
            4 => Ok(Self::StableSwap),
            tag => Err(FlashMintError::UnsupportedExchange { tag }),
        }
    }
}

// ============ Wire Descriptor ============

/// One swap leg as submitted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SwapData {
    /// Assets visited, first is sold and last is bought
    pub path: Vec<Address>,
    /// Fee tier per hop, concentrated liquidity only
    pub fees: Vec<u32>,
    /// Pool address, stable swap only
    pub pool: Address,
    /// Venue interpreting the rest of the descriptor
    pub exchange: Exchange,
}

impl SwapData {
    /// Leg that performs no swap
    pub fn none() -> Self {
        Self::default()
    }

    pub fn constant_product_a(path: Vec<Address>) -> Self {
        Self { path, exchange: Exchange::ConstantProductA, ..Self::default() }
    }

    pub fn constant_product_b(path: Vec<Address>) -> Self {
        Self { path, exchange: Exchange::ConstantProductB, ..Self::default() }
    }

    pub fn concentrated_liquidity(path: Vec<Address>, fees: Vec<u32>) -> Self {
        Self {
            path,
            fees,
            exchange: Exchange::ConcentratedLiquidity,
            ..Self::default()
        }
    }

    pub fn stable_swap(pool: Address, token_in: Address, token_out: Address) -> Self {
        Self {
            path: vec![token_in, token_out],
            pool,
            exchange: Exchange::StableSwap,
            ..Self::default()
        }
    }

    /// Decodes a borsh-encoded descriptor
    pub fn from_bytes(bytes: &[u8]) -> FlashMintResult<Self> {
        borsh::from_slice(bytes).map_err(|e| FlashMintError::CallbackDecode {
            reason: e.to_string(),
        })
    }
}

// ============ Typed Route ============

/// Which constant-product router a route uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantProductVenue {
    A,
    B,
}

/// A validated swap leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRoute {
    /// Amount passes through unchanged; `asset` is set when the path named it
    Identity { asset: Option<Address> },
    ConstantProduct {
        venue: ConstantProductVenue,
        path: Vec<Address>,
    },
    ConcentratedLiquidity {
        path: Vec<Address>,
        fees: Vec<u32>,
    },
    StableSwap {
        pool: Address,
        token_in: Address,
        token_out: Address,
    },
}

fn invalid(exchange: Exchange, reason: &'static str) -> FlashMintError {
    FlashMintError::InvalidSwapData {
        exchange: exchange.name(),
        reason,
    }
}

/// Checks shared by every routed (non-identity) path
fn check_hops(exchange: Exchange, path: &[Address], native_allowed: bool) -> FlashMintResult<()> {
    if path.len() < 2 {
        return Err(invalid(exchange, "path needs at least two assets"));
    }
    if path.iter().any(Address::is_zero) {
        return Err(invalid(exchange, "path contains the zero address"));
    }
    if !native_allowed && path.iter().any(Address::is_native) {
        return Err(invalid(exchange, "native ETH must be routed as WETH"));
    }
    if path.windows(2).any(|hop| hop[0] == hop[1]) {
        return Err(invalid(exchange, "path repeats an asset on consecutive hops"));
    }
    if path.first() == path.last() {
        return Err(invalid(exchange, "routed leg must change asset"));
    }
    Ok(())
}

impl TryFrom<&SwapData> for SwapRoute {
    type Error = FlashMintError;

    fn try_from(data: &SwapData) -> Result<Self, Self::Error> {
        let exchange = data.exchange;
        match exchange {
            Exchange::None => {
                if !data.fees.is_empty() {
                    return Err(invalid(exchange, "fees must be empty"));
                }
                if !data.pool.is_zero() {
                    return Err(invalid(exchange, "pool must be zero"));
                }
                match data.path.as_slice() {
                    [] => Ok(Self::Identity { asset: None }),
                    [first, rest @ ..] if rest.iter().all(|a| a == first) => {
                        Ok(Self::Identity { asset: Some(*first) })
                    }
                    _ => Err(invalid(exchange, "path must be empty or a single asset")),
                }
            }
            Exchange::ConstantProductA | Exchange::ConstantProductB => {
                if !data.fees.is_empty() {
                    return Err(invalid(exchange, "fees must be empty"));
                }
                if !data.pool.is_zero() {
                    return Err(invalid(exchange, "pool must be zero"));
                }
                check_hops(exchange, &data.path, false)?;
                let venue = if exchange == Exchange::ConstantProductA {
                    ConstantProductVenue::A
                } else {
                    ConstantProductVenue::B
                };
                Ok(Self::ConstantProduct {
                    venue,
                    path: data.path.clone(),
                })
            }
            Exchange::ConcentratedLiquidity => {
                if !data.pool.is_zero() {
                    return Err(invalid(exchange, "pool must be zero"));
                }
                check_hops(exchange, &data.path, false)?;
                if data.fees.len() != data.path.len() - 1 {
                    return Err(invalid(exchange, "PATH_FEES_MISMATCH"));
                }
                Ok(Self::ConcentratedLiquidity {
                    path: data.path.clone(),
                    fees: data.fees.clone(),
                })
            }
            Exchange::StableSwap => {
                if data.path.len() != 2 {
                    return Err(invalid(exchange, "CURVE_WRONG_PATH_LENGTH"));
                }
                if !data.fees.is_empty() {
                    return Err(invalid(exchange, "fees must be empty"));
                }
                if data.pool.is_zero() {
                    return Err(invalid(exchange, "pool is required"));
                }
                check_hops(exchange, &data.path, true)?;
                Ok(Self::StableSwap {
                    pool: data.pool,
                    token_in: data.path[0],
                    token_out: data.path[1],
                })
            }
        }
    }
}

impl SwapRoute {
    /// Venue tag the route was built from
    pub fn exchange(&self) -> Exchange {
        match self {
            Self::Identity { .. } => Exchange::None,
            Self::ConstantProduct { venue: ConstantProductVenue::A, .. } => Exchange::ConstantProductA,
            Self::ConstantProduct { venue: ConstantProductVenue::B, .. } => Exchange::ConstantProductB,
            Self::ConcentratedLiquidity { .. } => Exchange::ConcentratedLiquidity,
            Self::StableSwap { .. } => Exchange::StableSwap,
        }
    }

    /// Sold and bought asset, `None` for an identity leg
    pub fn endpoints(&self) -> Option<(Address, Address)> {
        match self {
            Self::Identity { .. } => None,
            Self::ConstantProduct { path, .. } | Self::ConcentratedLiquidity { path, .. } => {
                Some((*path.first()?, *path.last()?))
            }
            Self::StableSwap { token_in, token_out, .. } => Some((*token_in, *token_out)),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity { .. })
    }

    /// Fails unless the route converts `token_in` into `token_out`
    ///
    /// Native ETH and `weth` count as the same asset on either end.
    pub fn ensure_converts(&self, token_in: Address, token_out: Address, weth: Address) -> FlashMintResult<()> {
        let same = |a: Address, b: Address| same_asset(a, b, weth);
        match (self, self.endpoints()) {
            (Self::Identity { asset }, _) => {
                if !same(token_in, token_out) {
                    return Err(invalid(
                        Exchange::None,
                        "no-op leg cannot convert between different assets",
                    ));
                }
                match asset {
                    Some(asset) if !same(*asset, token_in) => Err(FlashMintError::SwapPathMismatch {
                        expected_in: token_in,
                        expected_out: token_out,
                        actual_in: *asset,
                        actual_out: *asset,
                    }),
                    _ => Ok(()),
                }
            }
            (_, Some((first, last))) => {
                if same(first, last) {
                    return Err(invalid(self.exchange(), "routed leg must change asset"));
                }
                if same(first, token_in) && same(last, token_out) {
                    Ok(())
                } else {
                    Err(FlashMintError::SwapPathMismatch {
                        expected_in: token_in,
                        expected_out: token_out,
                        actual_in: first,
                        actual_out: last,
                    })
                }
            }
            (_, None) => Err(invalid(self.exchange(), "path needs at least two assets")),
        }
    }
}

/// Equality that treats native ETH and WETH as one asset
pub fn same_asset(a: Address, b: Address, weth: Address) -> bool {
    let normalize = |x: Address| if x.is_native() { weth } else { x };
    normalize(a) == normalize(b)
}
