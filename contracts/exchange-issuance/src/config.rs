//! Configuration
//!
//! Addresses of every collaborator the zap talks to, loadable from TOML,
//! together with the live trait objects bound to those addresses. A
//! configuration value is immutable once built; changing it means building a
//! new one and handing it to `ExchangeIssuanceLeveraged::reconfigure`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use flashmint_common::{
    errors::{FlashMintError, FlashMintResult},
    interfaces::{FlashLoanProvider, IssuanceModule, LendingMarket, SetController},
    types::Address,
};
use flashmint_dex_adapter::{DexAdapter, Exchange};

// ============ Address Configuration ============

/// Collaborator addresses
///
/// ```toml
/// set_controller = "0x..."
/// debt_issuance_module = "0x..."
/// lending_pool = "0x..."
/// weth = "0x..."
/// operator = "0x..."
///
/// [routers]
/// constant_product_a = "0x..."
/// stable_swap = "0x..."
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeIssuanceConfig {
    pub set_controller: Address,
    pub debt_issuance_module: Address,
    /// Lending market and flash loan provider
    pub lending_pool: Address,
    pub weth: Address,
    /// Owner of the zap's privileged operations
    pub operator: Address,
    #[serde(default)]
    pub routers: RouterConfig,
}

/// Router per venue, absent venues are disabled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_product_a: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_product_b: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentrated_liquidity: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_swap: Option<Address>,
}

impl RouterConfig {
    /// Configured router address for `exchange`
    pub fn get(&self, exchange: Exchange) -> Option<Address> {
        match exchange {
            Exchange::None => None,
            Exchange::ConstantProductA => self.constant_product_a,
            Exchange::ConstantProductB => self.constant_product_b,
            Exchange::ConcentratedLiquidity => self.concentrated_liquidity,
            Exchange::StableSwap => self.stable_swap,
        }
    }
}

const VENUES: [Exchange; 4] = [
    Exchange::ConstantProductA,
    Exchange::ConstantProductB,
    Exchange::ConcentratedLiquidity,
    Exchange::StableSwap,
];

fn require_nonzero(name: &str, address: Address) -> FlashMintResult<()> {
    if address.is_zero() || address.is_native() {
        return Err(FlashMintError::Config(format!("{name} must be a nonzero contract address")));
    }
    Ok(())
}

impl ExchangeIssuanceConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(content: &str) -> FlashMintResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| FlashMintError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> FlashMintResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| FlashMintError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> FlashMintResult<String> {
        toml::to_string(self).map_err(|e| FlashMintError::Config(e.to_string()))
    }

    /// Every configured address must be a real account
    pub fn validate(&self) -> FlashMintResult<()> {
        require_nonzero("set_controller", self.set_controller)?;
        require_nonzero("debt_issuance_module", self.debt_issuance_module)?;
        require_nonzero("lending_pool", self.lending_pool)?;
        require_nonzero("weth", self.weth)?;
        require_nonzero("operator", self.operator)?;
        for exchange in VENUES {
            if let Some(router) = self.routers.get(exchange) {
                require_nonzero(exchange.name(), router)?;
            }
        }
        Ok(())
    }
}

// ============ Bound Collaborators ============

/// Live collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub set_controller: Arc<dyn SetController>,
    pub issuance_module: Arc<dyn IssuanceModule>,
    pub lending_market: Arc<dyn LendingMarket>,
    pub flash_loan_provider: Arc<dyn FlashLoanProvider>,
    pub dex: DexAdapter,
}

/// A validated configuration and the collaborators it names
#[derive(Clone)]
pub struct Settings {
    config: Arc<ExchangeIssuanceConfig>,
    collaborators: Collaborators,
}

fn mismatch(name: &str, expected: Address, actual: Address) -> FlashMintError {
    FlashMintError::Config(format!("{name} is configured as {expected} but bound to {actual}"))
}

impl Settings {
    /// Binds collaborators to a configuration, checking every address matches
    pub fn new(config: ExchangeIssuanceConfig, collaborators: Collaborators) -> FlashMintResult<Self> {
        config.validate()?;

        let bound = [
            ("set_controller", config.set_controller, collaborators.set_controller.address()),
            ("debt_issuance_module", config.debt_issuance_module, collaborators.issuance_module.address()),
            ("lending_pool", config.lending_pool, collaborators.lending_market.address()),
            ("lending_pool", config.lending_pool, collaborators.flash_loan_provider.address()),
            ("weth", config.weth, collaborators.dex.weth()),
        ];
        for (name, expected, actual) in bound {
            if expected != actual {
                return Err(mismatch(name, expected, actual));
            }
        }

        for exchange in VENUES {
            let configured = config.routers.get(exchange);
            let live = collaborators.dex.routers().router_address(exchange);
            if configured != live {
                return Err(FlashMintError::Config(format!(
                    "{} router is configured as {configured:?} but bound to {live:?}",
                    exchange.name()
                )));
            }
        }

        Ok(Self {
            config: Arc::new(config),
            collaborators,
        })
    }

    pub fn config(&self) -> &Arc<ExchangeIssuanceConfig> {
        &self.config
    }

    pub fn set_controller(&self) -> &dyn SetController {
        self.collaborators.set_controller.as_ref()
    }

    pub fn issuance_module(&self) -> &dyn IssuanceModule {
        self.collaborators.issuance_module.as_ref()
    }

    pub fn lending_market(&self) -> &dyn LendingMarket {
        self.collaborators.lending_market.as_ref()
    }

    pub fn flash_loan_provider(&self) -> &dyn FlashLoanProvider {
        self.collaborators.flash_loan_provider.as_ref()
    }

    pub fn dex(&self) -> &DexAdapter {
        &self.collaborators.dex
    }
}
