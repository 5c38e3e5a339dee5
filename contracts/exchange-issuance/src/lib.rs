//! Leveraged Exchange Issuance
//!
//! Flash-mint "zap" for leveraged set tokens. A caller mints or redeems a
//! leveraged token with any input or output token in one atomic call; the
//! zap flash-borrows the collateral (mint) or the debt (redeem), runs the
//! issuance module inside the loan callback, swaps both legs and repays.
//!
//! ## Flow
//!
//! ```text
//! entry point -> sizing -> flash loan -> execute_operation
//!             -> settlement (issue/redeem, debt leg, payment leg)
//!             -> reconciliation -> repayment pulled by the lender
//! ```
//!
//! ## Key Features
//!
//! - **All or nothing**: every entry point runs inside `Ledger::transact`
//! - **Balance-based accounting**: every amount is a measured balance delta
//! - **Strict callback authorization**: lender, initiator and phase are
//!   checked before any effect
//! - **Immutable configuration**: replaced wholesale by an operator, never
//!   mutated mid-settlement

#![allow(clippy::too_many_arguments)]

pub mod approvals;
pub mod calculator;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod quotes;
pub mod reconciliation;
pub mod settlement;

#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::sync::Arc;

use tracing::info;

use flashmint_common::{
    access_control::{grant_operator, require_role, revoke_operator, AccessControlState, Role},
    errors::{FlashMintError, FlashMintResult, SettlementStage},
    events::FlashMintEvent,
    ledger::Ledger,
    types::{Address, Amount, ETH_ADDRESS},
};
use flashmint_dex_adapter::SwapData;

pub use calculator::{get_leveraged_token_data, LeveragedTokenData};
pub use config::{Collaborators, ExchangeIssuanceConfig, RouterConfig, Settings};
pub use context::{FlashLoanContext, LoanPhase};

/// The exchange issuance zap
pub struct ExchangeIssuanceLeveraged {
    address: Address,
    settings: Arc<Settings>,
    access: AccessControlState,
    phase: Cell<LoanPhase>,
}

fn require_erc20(token: Address) -> FlashMintResult<()> {
    if token.is_zero() {
        return Err(FlashMintError::InvalidAddress {
            reason: "token cannot be the zero address",
        });
    }
    if token.is_native() {
        return Err(FlashMintError::InvalidInput {
            param: "token",
            reason: "native ETH must use the ETH entry points",
        });
    }
    Ok(())
}

impl ExchangeIssuanceLeveraged {
    /// Deploys a zap at `address`; the configured operator becomes its owner
    pub fn new(address: Address, settings: Settings) -> FlashMintResult<Self> {
        if address.is_zero() || address.is_native() {
            return Err(FlashMintError::InvalidAddress {
                reason: "zap address cannot be zero or the native sentinel",
            });
        }
        let access = AccessControlState::new(settings.config().operator)?;
        Ok(Self {
            address,
            settings: Arc::new(settings),
            access,
            phase: Cell::new(LoanPhase::Idle),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &ExchangeIssuanceConfig {
        self.settings.config()
    }

    pub fn access(&self) -> &AccessControlState {
        &self.access
    }

    // ============ Administration ============

    /// Swaps in a new configuration
    ///
    /// Requires the operator role; handing ownership to a different
    /// `operator` requires the owner.
    pub fn reconfigure(&mut self, ledger: &mut Ledger, operator: Address, settings: Settings) -> FlashMintResult<()> {
        require_role(&self.access, operator, Role::Operator)?;
        let new_owner = settings.config().operator;
        if new_owner != self.access.owner {
            require_role(&self.access, operator, Role::Owner)?;
            let operators = std::mem::take(&mut self.access.operators);
            self.access = AccessControlState::new(new_owner)?;
            self.access.operators = operators;
        }
        self.settings = Arc::new(settings);
        ledger.emit(FlashMintEvent::ConfigUpdated { operator });
        info!(%operator, zap = %self.address, "configuration replaced");
        Ok(())
    }

    pub fn grant_operator(&mut self, granter: Address, grantee: Address) -> FlashMintResult<()> {
        grant_operator(&mut self.access, granter, grantee)
    }

    pub fn revoke_operator(&mut self, revoker: Address, target: Address) -> FlashMintResult<()> {
        revoke_operator(&mut self.access, revoker, target)
    }

    // ============ Views ============

    /// Collateral and debt for `set_amount`, see [`calculator::get_leveraged_token_data`]
    pub fn get_leveraged_token_data(
        &self,
        ledger: &Ledger,
        set_token: Address,
        set_amount: Amount,
        is_issuance: bool,
    ) -> FlashMintResult<LeveragedTokenData> {
        get_leveraged_token_data(&self.settings, ledger, set_token, set_amount, is_issuance)
    }

    // ============ Issuance ============

    /// Mints exactly `set_amount` paying with at most `max_amount_in` of `input_token`
    ///
    /// Returns the input actually spent.
    pub fn issue_exact_set_from_erc20(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        set_amount: Amount,
        input_token: Address,
        max_amount_in: Amount,
        debt_collateral: SwapData,
        input_swap: SwapData,
    ) -> FlashMintResult<Amount> {
        ledger.transact(|ledger| {
            require_erc20(input_token)?;
            if max_amount_in == 0 {
                return Err(FlashMintError::ZeroAmount);
            }
            self.issue(ledger, caller, set_token, set_amount, input_token, max_amount_in, debt_collateral, input_swap)
        })
    }

    /// Mints exactly `set_amount` paying with at most `value` native ETH
    ///
    /// Unspent ETH is refunded. Returns the ETH actually spent.
    pub fn issue_exact_set_from_eth(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        value: Amount,
        set_token: Address,
        set_amount: Amount,
        debt_collateral: SwapData,
        input_swap: SwapData,
    ) -> FlashMintResult<Amount> {
        ledger.transact(|ledger| {
            if value == 0 {
                return Err(FlashMintError::ZeroAmount);
            }
            ledger.transfer(ETH_ADDRESS, caller, self.address, value)?;
            self.settings.dex().wrapped_native().deposit(ledger, self.address, value)?;
            self.issue(ledger, caller, set_token, set_amount, ETH_ADDRESS, value, debt_collateral, input_swap)
        })
    }

    fn issue(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        set_amount: Amount,
        payment_token: Address,
        limit_amount: Amount,
        debt_collateral: SwapData,
        input_swap: SwapData,
    ) -> FlashMintResult<Amount> {
        let data = self
            .get_leveraged_token_data(ledger, set_token, set_amount, true)
            .map_err(|e| e.in_stage(SettlementStage::Sizing))?;
        let dex = self.settings.dex();
        dex.validate(&debt_collateral, data.debt_token, data.collateral_token)?;
        dex.validate(&input_swap, payment_token, data.collateral_token)?;
        self.require_set_token_approved(ledger, set_token, &data)?;

        let context = FlashLoanContext {
            is_issuance: true,
            set_token,
            set_amount,
            original_sender: caller,
            limit_amount,
            payment_token,
            swap_data_debt_collateral: debt_collateral,
            swap_data_input_output: input_swap,
        };
        let spent = self.initiate_flash_loan(ledger, data.collateral_token, data.collateral_amount, &context)?;
        info!(%caller, %set_token, set_amount, %payment_token, spent, "leveraged token issued");
        Ok(spent)
    }

    // ============ Redemption ============

    /// Redeems exactly `set_amount` for at least `min_amount_out` of `output_token`
    ///
    /// Returns the output actually received.
    pub fn redeem_exact_set_for_erc20(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        set_amount: Amount,
        output_token: Address,
        min_amount_out: Amount,
        collateral_debt: SwapData,
        output_swap: SwapData,
    ) -> FlashMintResult<Amount> {
        ledger.transact(|ledger| {
            require_erc20(output_token)?;
            self.redeem(ledger, caller, set_token, set_amount, output_token, min_amount_out, collateral_debt, output_swap)
        })
    }

    /// Redeems exactly `set_amount` for at least `min_amount_out` native ETH
    pub fn redeem_exact_set_for_eth(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        set_amount: Amount,
        min_amount_out: Amount,
        collateral_debt: SwapData,
        output_swap: SwapData,
    ) -> FlashMintResult<Amount> {
        ledger.transact(|ledger| {
            self.redeem(ledger, caller, set_token, set_amount, ETH_ADDRESS, min_amount_out, collateral_debt, output_swap)
        })
    }

    fn redeem(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        set_amount: Amount,
        payment_token: Address,
        limit_amount: Amount,
        collateral_debt: SwapData,
        output_swap: SwapData,
    ) -> FlashMintResult<Amount> {
        let data = self
            .get_leveraged_token_data(ledger, set_token, set_amount, false)
            .map_err(|e| e.in_stage(SettlementStage::Sizing))?;
        let dex = self.settings.dex();
        dex.validate(&collateral_debt, data.collateral_token, data.debt_token)?;
        dex.validate(&output_swap, data.collateral_token, payment_token)?;
        self.require_set_token_approved(ledger, set_token, &data)?;

        ledger
            .transfer_from(set_token, self.address, caller, self.address, set_amount)
            .map_err(|e| e.in_stage(SettlementStage::Redeem))?;

        let context = FlashLoanContext {
            is_issuance: false,
            set_token,
            set_amount,
            original_sender: caller,
            limit_amount,
            payment_token,
            swap_data_debt_collateral: collateral_debt,
            swap_data_input_output: output_swap,
        };
        let received = self.initiate_flash_loan(ledger, data.debt_token, data.debt_amount, &context)?;
        info!(%caller, %set_token, set_amount, %payment_token, received, "leveraged token redeemed");
        Ok(received)
    }
}
