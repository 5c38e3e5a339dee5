//! Leveraged Position Calculator
//!
//! Sizes a flash loan from the issuance module's own unit quotes, so the
//! collateral and debt amounts computed before a settlement are exactly the
//! amounts the module moves during it.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use flashmint_common::{
    errors::{FlashMintError, FlashMintResult},
    ledger::Ledger,
    types::{Address, Amount},
};

use crate::config::Settings;

/// Collateral and debt a quantity of a leveraged token requires or returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LeveragedTokenData {
    /// Lending-market receipt token the module consumes or returns
    pub collateral_a_token: Address,
    /// Underlying of `collateral_a_token`
    pub collateral_token: Address,
    pub collateral_amount: Amount,
    pub debt_token: Address,
    pub debt_amount: Amount,
}

/// Reads component units for `set_amount` of `set_token`
///
/// Issuance units round equity up and debt down, redemption units the
/// opposite, exactly as the module will settle.
pub fn get_leveraged_token_data(
    settings: &Settings,
    ledger: &Ledger,
    set_token: Address,
    set_amount: Amount,
    is_issuance: bool,
) -> FlashMintResult<LeveragedTokenData> {
    if set_amount == 0 {
        return Err(FlashMintError::ZeroAmount);
    }
    if !settings.set_controller().is_set(set_token) {
        return Err(FlashMintError::InvalidSetToken { token: set_token });
    }

    let module = settings.issuance_module();
    let units = if is_issuance {
        module.required_component_issuance_units(ledger, set_token, set_amount)?
    } else {
        module.required_component_redemption_units(ledger, set_token, set_amount)?
    };
    if units.len() != 2 || units.equity_units.len() != 2 || units.debt_units.len() != 2 {
        return Err(FlashMintError::UnsupportedComponents { count: units.len() });
    }

    let debt_positions = units.debt_units.iter().filter(|d| **d > 0).count();
    if debt_positions > 1 {
        return Err(FlashMintError::TooManyDebtPositions);
    }
    let Some(debt_index) = units.debt_units.iter().position(|d| *d > 0) else {
        return Err(FlashMintError::InvalidInput {
            param: "set_token",
            reason: "leveraged token has no debt position",
        });
    };
    let collateral_index = 1 - debt_index;
    let collateral_amount = units.equity_units[collateral_index];
    if collateral_amount == 0 {
        return Err(FlashMintError::InvalidInput {
            param: "set_token",
            reason: "leveraged token has no collateral position",
        });
    }

    let collateral_a_token = units.components[collateral_index];
    let collateral_token = settings.lending_market().underlying_asset(collateral_a_token)?;
    let data = LeveragedTokenData {
        collateral_a_token,
        collateral_token,
        collateral_amount,
        debt_token: units.components[debt_index],
        debt_amount: units.debt_units[debt_index],
    };
    debug!(
        %set_token,
        set_amount,
        is_issuance,
        collateral = %data.collateral_token,
        collateral_amount,
        debt = %data.debt_token,
        debt_amount = data.debt_amount,
        "sized leveraged token"
    );
    Ok(data)
}
