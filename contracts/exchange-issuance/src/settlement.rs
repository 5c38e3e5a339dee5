//! Settlement Engine
//!
//! Runs inside the flash loan callback. Issue or redeem always happens
//! before either swap leg, and both legs before reconciliation. Every amount
//! is the balance delta observed after the call that produced it.

use tracing::debug;

use flashmint_common::{
    errors::{FlashMintError, FlashMintResult, SettlementStage},
    events::FlashMintEvent,
    ledger::Ledger,
    math::safe_add,
    types::{Address, Amount},
};
use flashmint_dex_adapter::SwapSide;

use crate::calculator::{get_leveraged_token_data, LeveragedTokenData};
use crate::context::FlashLoanContext;
use crate::ExchangeIssuanceLeveraged;

/// Tags an error with the stage it surfaced in
pub(crate) fn at(stage: SettlementStage) -> impl FnOnce(FlashMintError) -> FlashMintError {
    move |err| err.in_stage(stage)
}

/// Balance gained by `holder` since `before`
pub(crate) fn gained(ledger: &Ledger, token: Address, holder: Address, before: Amount) -> FlashMintResult<Amount> {
    ledger
        .balance_of(token, holder)
        .checked_sub(before)
        .ok_or(FlashMintError::Underflow)
}

fn loan_matches(asset: Address, amount: Amount, expected_asset: Address, expected_amount: Amount) -> FlashMintResult<()> {
    if asset != expected_asset || amount != expected_amount {
        return Err(FlashMintError::FlashLoanFailed {
            reason: "loan does not match the sized position",
        });
    }
    Ok(())
}

impl ExchangeIssuanceLeveraged {
    fn resize(&self, ledger: &Ledger, context: &FlashLoanContext) -> FlashMintResult<LeveragedTokenData> {
        get_leveraged_token_data(
            &self.settings,
            ledger,
            context.set_token,
            context.set_amount,
            context.is_issuance,
        )
        .map_err(at(SettlementStage::Sizing))
    }

    /// Mint side of the callback; `amount` of collateral was borrowed
    ///
    /// Returns the payment token spent.
    pub(crate) fn settle_mint(
        &self,
        ledger: &mut Ledger,
        context: &FlashLoanContext,
        asset: Address,
        amount: Amount,
        premium: Amount,
    ) -> FlashMintResult<Amount> {
        let zap = self.address;
        let data = self.resize(ledger, context)?;
        loan_matches(asset, amount, data.collateral_token, data.collateral_amount)?;
        let owed = safe_add(amount, premium)?;

        // 1. Wrap the borrowed collateral
        self.settings
            .lending_market()
            .deposit(ledger, zap, asset, amount, zap)
            .map_err(at(SettlementStage::Collateralize))?;

        // 2. Issue to the caller; the module hands the zap the debt
        let debt_before = ledger.balance_of(data.debt_token, zap);
        self.settings
            .issuance_module()
            .issue(ledger, zap, context.set_token, context.set_amount, context.original_sender)
            .map_err(at(SettlementStage::Issue))?;
        let debt_received = gained(ledger, data.debt_token, zap, debt_before)?;

        // 3. Sell all of it for collateral, bounded later by the max input
        let collateral_obtained = self
            .settings
            .dex()
            .resolve_and_swap(
                ledger,
                zap,
                &context.swap_data_debt_collateral,
                SwapSide::ExactInput,
                debt_received,
                0,
            )
            .map_err(at(SettlementStage::DebtCollateralSwap))?;
        debug!(debt_received, collateral_obtained, owed, "debt leg settled");

        // 4-5. Cover what the debt leg left short
        let spent = self.cover_shortfall(ledger, context, &data, owed, collateral_obtained)?;

        ledger.emit(FlashMintEvent::ExchangeIssue {
            caller: context.original_sender,
            set_token: context.set_token,
            input_token: context.payment_token,
            amount_spent: spent,
            set_amount: context.set_amount,
        });
        Ok(spent)
    }

    /// Redeem side of the callback; `amount` of debt was borrowed
    ///
    /// Returns the payment token received by the caller.
    pub(crate) fn settle_redeem(
        &self,
        ledger: &mut Ledger,
        context: &FlashLoanContext,
        asset: Address,
        amount: Amount,
        premium: Amount,
    ) -> FlashMintResult<Amount> {
        let zap = self.address;
        let data = self.resize(ledger, context)?;
        loan_matches(asset, amount, data.debt_token, data.debt_amount)?;
        let owed = safe_add(amount, premium)?;

        // 1. The set tokens were pulled before the loan
        // 2. Redeem; the module takes the borrowed debt and returns the aToken
        let a_token_before = ledger.balance_of(data.collateral_a_token, zap);
        self.settings
            .issuance_module()
            .redeem(ledger, zap, context.set_token, context.set_amount, zap)
            .map_err(at(SettlementStage::Redeem))?;
        let a_token_received = gained(ledger, data.collateral_a_token, zap, a_token_before)?;

        // 3. Unwrap to the underlying collateral
        let collateral_before = ledger.balance_of(data.collateral_token, zap);
        self.settings
            .lending_market()
            .withdraw(ledger, zap, data.collateral_token, a_token_received, zap)
            .map_err(at(SettlementStage::Collateralize))?;
        let collateral_obtained = gained(ledger, data.collateral_token, zap, collateral_before)?;

        // 4. Buy back exactly what the lender is owed
        let debt_before = ledger.balance_of(data.debt_token, zap);
        let collateral_spent = self
            .settings
            .dex()
            .resolve_and_swap(
                ledger,
                zap,
                &context.swap_data_debt_collateral,
                SwapSide::ExactOutput,
                owed,
                collateral_obtained,
            )
            .map_err(at(SettlementStage::DebtCollateralSwap))?;
        let remaining = collateral_obtained
            .checked_sub(collateral_spent)
            .ok_or(FlashMintError::Underflow)?;
        let debt_extra = gained(ledger, data.debt_token, zap, debt_before)?.saturating_sub(owed);
        if debt_extra > 0 {
            ledger
                .transfer(data.debt_token, zap, context.original_sender, debt_extra)
                .map_err(at(SettlementStage::Reconciliation))?;
        }
        debug!(collateral_obtained, collateral_spent, owed, debt_extra, "debt leg settled");

        // 5. Everything left goes to the caller as the payment token
        let received = self.pay_out(ledger, context, &data, remaining)?;

        ledger.emit(FlashMintEvent::ExchangeRedeem {
            caller: context.original_sender,
            set_token: context.set_token,
            output_token: context.payment_token,
            set_amount: context.set_amount,
            amount_received: received,
        });
        Ok(received)
    }
}
