//! Debt Issuance Module
//!
//! Reference set token controller and issuance module for leveraged set
//! tokens. A leveraged set holds one lending-market collateral position
//! (an aToken) and owes one variable-rate debt position.
//!
//! ## Key Features
//!
//! - **Issue**: pulls aToken equity from the issuer, borrows the debt on the
//!   set's behalf, hands the borrowed asset to the issuer, mints the set
//! - **Redeem**: burns the set, pulls the debt asset from the redeemer,
//!   repays the set's loan, returns the aToken equity
//! - **Rounding**: equity rounds in the set's favor on both sides, debt
//!   rounds in the set's favor on both sides
//! - **Drift**: per-unit positions can change between calls and are read
//!   fresh on every quote

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use flashmint_common::{
    errors::{FlashMintError, FlashMintResult},
    interfaces::{ComponentUnits, IssuanceModule, LendingMarket, SetController},
    ledger::Ledger,
    math::{precise_mul, precise_mul_ceil},
    types::{Address, Amount},
};

// ============ Set Token Controller ============

/// Registry of set tokens
#[derive(Debug, Clone, Default)]
pub struct SetTokenController {
    address: Address,
    sets: BTreeSet<Address>,
}

impl SetTokenController {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            sets: BTreeSet::new(),
        }
    }

    /// Registers a new set token
    pub fn add_set(&mut self, set_token: Address) -> FlashMintResult<()> {
        if set_token.is_zero() || set_token.is_native() {
            return Err(FlashMintError::InvalidAddress {
                reason: "set token cannot be zero or the native sentinel",
            });
        }
        self.sets.insert(set_token);
        Ok(())
    }

    pub fn remove_set(&mut self, set_token: Address) {
        self.sets.remove(&set_token);
    }
}

impl SetController for SetTokenController {
    fn address(&self) -> Address {
        self.address
    }

    fn is_set(&self, token: Address) -> bool {
        self.sets.contains(&token)
    }
}

// ============ Positions ============

/// Per-unit composition of one leveraged set token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LeveragedPosition {
    /// Lending-market receipt token held as equity
    pub collateral_a_token: Address,
    /// aToken per 1e18 set units
    pub collateral_unit: Amount,
    /// Asset the set owes
    pub debt_asset: Address,
    /// Debt per 1e18 set units
    pub debt_unit: Amount,
}

// ============ Issuance Module ============

/// Issuance module for leveraged sets backed by a lending market
#[derive(Clone)]
pub struct DebtIssuanceModule {
    address: Address,
    lending: Arc<dyn LendingMarket>,
    positions: BTreeMap<Address, LeveragedPosition>,
    paused: bool,
}

impl DebtIssuanceModule {
    pub fn new(address: Address, lending: Arc<dyn LendingMarket>) -> Self {
        Self {
            address,
            lending,
            positions: BTreeMap::new(),
            paused: false,
        }
    }

    /// Enables `set_token` on this module with its starting position
    pub fn initialize(&mut self, set_token: Address, position: LeveragedPosition) -> FlashMintResult<()> {
        if position.collateral_unit == 0 || position.debt_unit == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        if position.collateral_a_token.is_zero() || position.debt_asset.is_zero() {
            return Err(FlashMintError::InvalidAddress {
                reason: "position tokens cannot be zero",
            });
        }
        self.lending.underlying_asset(position.collateral_a_token)?;
        self.positions.insert(set_token, position);
        Ok(())
    }

    /// Rebalances a set's per-unit position
    pub fn set_position_units(&mut self, set_token: Address, collateral_unit: Amount, debt_unit: Amount) -> FlashMintResult<()> {
        let position = self
            .positions
            .get_mut(&set_token)
            .ok_or(FlashMintError::InvalidSetToken { token: set_token })?;
        position.collateral_unit = collateral_unit;
        position.debt_unit = debt_unit;
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn position(&self, set_token: Address) -> FlashMintResult<LeveragedPosition> {
        self.positions
            .get(&set_token)
            .copied()
            .ok_or(FlashMintError::InvalidSetToken { token: set_token })
    }

    fn units(&self, set_token: Address, equity: Amount, debt: Amount) -> FlashMintResult<ComponentUnits> {
        let position = self.position(set_token)?;
        Ok(ComponentUnits {
            components: vec![position.collateral_a_token, position.debt_asset],
            equity_units: vec![equity, 0],
            debt_units: vec![0, debt],
        })
    }

    fn ensure_active(&self, quantity: Amount) -> FlashMintResult<()> {
        if self.paused {
            return Err(FlashMintError::IssuanceRejected { reason: "module paused" });
        }
        if quantity == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        Ok(())
    }
}

impl IssuanceModule for DebtIssuanceModule {
    fn address(&self) -> Address {
        self.address
    }

    fn required_component_issuance_units(
        &self,
        _ledger: &Ledger,
        set_token: Address,
        quantity: Amount,
    ) -> FlashMintResult<ComponentUnits> {
        let position = self.position(set_token)?;
        self.units(
            set_token,
            precise_mul_ceil(quantity, position.collateral_unit)?,
            precise_mul(quantity, position.debt_unit)?,
        )
    }

    fn required_component_redemption_units(
        &self,
        _ledger: &Ledger,
        set_token: Address,
        quantity: Amount,
    ) -> FlashMintResult<ComponentUnits> {
        let position = self.position(set_token)?;
        self.units(
            set_token,
            precise_mul(quantity, position.collateral_unit)?,
            precise_mul_ceil(quantity, position.debt_unit)?,
        )
    }

    fn issue(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        quantity: Amount,
        to: Address,
    ) -> FlashMintResult<()> {
        self.ensure_active(quantity)?;
        let position = self.position(set_token)?;
        let units = self.required_component_issuance_units(ledger, set_token, quantity)?;
        let equity = units.equity_units[0];
        let debt = units.debt_units[1];

        // 1. Equity into the set
        ledger.transfer_from(position.collateral_a_token, self.address, caller, set_token, equity)?;

        // 2. Set borrows its debt and hands it to the issuer
        if debt > 0 {
            self.lending.borrow(ledger, set_token, position.debt_asset, debt, set_token)?;
            ledger.transfer(position.debt_asset, set_token, caller, debt)?;
        }

        // 3. Mint
        ledger.mint(set_token, to, quantity)?;
        debug!(%set_token, %caller, quantity, equity, debt, "set issued");
        Ok(())
    }

    fn redeem(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        quantity: Amount,
        to: Address,
    ) -> FlashMintResult<()> {
        self.ensure_active(quantity)?;
        let position = self.position(set_token)?;
        let units = self.required_component_redemption_units(ledger, set_token, quantity)?;
        let equity = units.equity_units[0];
        let debt = units.debt_units[1];

        // 1. Burn
        ledger.burn(set_token, caller, quantity)?;

        // 2. Redeemer funds the debt, the set repays it
        if debt > 0 {
            ledger.transfer_from(position.debt_asset, self.address, caller, set_token, debt)?;
            ledger.approve(position.debt_asset, set_token, self.lending.address(), debt);
            self.lending.repay(ledger, set_token, position.debt_asset, debt, set_token)?;
        }

        // 3. Equity out of the set
        ledger.transfer(position.collateral_a_token, set_token, to, equity)?;
        debug!(%set_token, %caller, quantity, equity, debt, "set redeemed");
        Ok(())
    }
}
