//! Surplus/Shortfall Reconciliation
//!
//! Closes a settlement against the caller: pulls what the debt leg left
//! short on issue and refunds the rest, or pays out everything left on
//! redeem. The caller's max input and min output are enforced here.

use tracing::debug;

use flashmint_common::{
    errors::{FlashMintError, FlashMintResult, SettlementStage},
    ledger::Ledger,
    math::safe_add,
    types::{Amount, ETH_ADDRESS},
};
use flashmint_dex_adapter::SwapSide;

use crate::calculator::LeveragedTokenData;
use crate::context::FlashLoanContext;
use crate::settlement::at;
use crate::ExchangeIssuanceLeveraged;

/// Maps a payment leg's swap bound onto the caller's own bound
///
/// The bound the caller chose surfaces as is; anything else is tagged with
/// the payment leg's stage.
fn payment_leg_error(side: SwapSide) -> impl FnOnce(FlashMintError) -> FlashMintError {
    move |err| match (side, err) {
        (SwapSide::ExactOutput, FlashMintError::ExcessiveSwapInput { amount_in, max_in }) => {
            FlashMintError::InsufficientInputAmount {
                spent: amount_in,
                max: max_in,
            }
        }
        (SwapSide::ExactInput, FlashMintError::InsufficientSwapOutput { amount_out, min_out }) => {
            FlashMintError::InsufficientOutputAmount {
                received: amount_out,
                min: min_out,
            }
        }
        (_, other) => other.in_stage(SettlementStage::InputOutputSwap),
    }
}

impl ExchangeIssuanceLeveraged {
    /// Covers `owed - obtained` collateral from the caller's payment token
    ///
    /// Refunds unspent input and any surplus collateral. Returns the payment
    /// token spent.
    pub(crate) fn cover_shortfall(
        &self,
        ledger: &mut Ledger,
        context: &FlashLoanContext,
        data: &LeveragedTokenData,
        owed: Amount,
        obtained: Amount,
    ) -> FlashMintResult<Amount> {
        let zap = self.address;
        let sender = context.original_sender;
        let limit = context.limit_amount;
        let shortfall = owed.saturating_sub(obtained);
        let mut surplus = obtained.saturating_sub(owed);
        let dex = self.settings.dex();

        let collateral = data.collateral_token;
        let collateral_before = ledger.balance_of(collateral, zap);
        let spent = if context.payment_token.is_native() {
            // The ETH value was wrapped on entry
            let spent = dex
                .resolve_and_swap(ledger, zap, &context.swap_data_input_output, SwapSide::ExactOutput, shortfall, limit)
                .map_err(payment_leg_error(SwapSide::ExactOutput))?;
            let refund = limit.checked_sub(spent).ok_or(FlashMintError::Underflow)?;
            if refund > 0 {
                dex.wrapped_native()
                    .withdraw(ledger, zap, refund)
                    .map_err(at(SettlementStage::Reconciliation))?;
                ledger
                    .transfer(ETH_ADDRESS, zap, sender, refund)
                    .map_err(at(SettlementStage::Reconciliation))?;
            }
            spent
        } else if context.payment_token == collateral {
            if shortfall > limit {
                return Err(FlashMintError::InsufficientInputAmount { spent: shortfall, max: limit });
            }
            if shortfall > 0 {
                ledger
                    .transfer_from(collateral, zap, sender, zap, shortfall)
                    .map_err(at(SettlementStage::Reconciliation))?;
            }
            shortfall
        } else if shortfall == 0 {
            0
        } else {
            let token = context.payment_token;
            ledger
                .transfer_from(token, zap, sender, zap, limit)
                .map_err(at(SettlementStage::InputOutputSwap))?;
            let spent = dex
                .resolve_and_swap(ledger, zap, &context.swap_data_input_output, SwapSide::ExactOutput, shortfall, limit)
                .map_err(payment_leg_error(SwapSide::ExactOutput))?;
            let refund = limit.checked_sub(spent).ok_or(FlashMintError::Underflow)?;
            if refund > 0 {
                ledger
                    .transfer(token, zap, sender, refund)
                    .map_err(at(SettlementStage::Reconciliation))?;
            }
            spent
        };

        if spent > limit {
            return Err(FlashMintError::InsufficientInputAmount { spent, max: limit });
        }
        // Venues quoting input by search may deliver a few wei over the shortfall
        if context.payment_token != collateral {
            let bought = ledger.balance_of(collateral, zap).saturating_sub(collateral_before);
            surplus = safe_add(surplus, bought.saturating_sub(shortfall))?;
        }
        if surplus > 0 {
            ledger
                .transfer(collateral, zap, sender, surplus)
                .map_err(at(SettlementStage::Reconciliation))?;
        }
        debug!(shortfall, surplus, spent, max = limit, "issue reconciled");
        Ok(spent)
    }

    /// Converts `remaining` collateral into the payment token and sends it
    /// to the caller; returns the amount sent
    pub(crate) fn pay_out(
        &self,
        ledger: &mut Ledger,
        context: &FlashLoanContext,
        data: &LeveragedTokenData,
        remaining: Amount,
    ) -> FlashMintResult<Amount> {
        let zap = self.address;
        let sender = context.original_sender;
        let min = context.limit_amount;
        let dex = self.settings.dex();

        let received = dex
            .resolve_and_swap(ledger, zap, &context.swap_data_input_output, SwapSide::ExactInput, remaining, min)
            .map_err(payment_leg_error(SwapSide::ExactInput))?;
        if received < min {
            return Err(FlashMintError::InsufficientOutputAmount { received, min });
        }

        if received > 0 {
            if context.payment_token.is_native() {
                dex.wrapped_native()
                    .withdraw(ledger, zap, received)
                    .map_err(at(SettlementStage::Reconciliation))?;
                ledger
                    .transfer(ETH_ADDRESS, zap, sender, received)
                    .map_err(at(SettlementStage::Reconciliation))?;
            } else {
                ledger
                    .transfer(context.payment_token, zap, sender, received)
                    .map_err(at(SettlementStage::Reconciliation))?;
            }
        }
        debug!(remaining, collateral = %data.collateral_token, received, min, "redeem reconciled");
        Ok(received)
    }
}
