//! Settlement Quotes
//!
//! Off-chain estimates of an issue or redeem, priced from venue quotes on
//! the current ledger state and the lender's premium. Not used on the
//! settlement path.

use flashmint_common::{
    errors::FlashMintResult,
    ledger::Ledger,
    math::{calculate_premium, safe_add},
    types::{Address, Amount},
};
use flashmint_dex_adapter::SwapData;

use crate::ExchangeIssuanceLeveraged;

impl ExchangeIssuanceLeveraged {
    /// Estimated `input_token` needed to issue `set_amount`
    pub fn get_issue_exact_set(
        &self,
        ledger: &Ledger,
        set_token: Address,
        set_amount: Amount,
        input_token: Address,
        debt_collateral: &SwapData,
        input_swap: &SwapData,
    ) -> FlashMintResult<Amount> {
        let data = self.get_leveraged_token_data(ledger, set_token, set_amount, true)?;
        let dex = self.settings.dex();
        dex.validate(debt_collateral, data.debt_token, data.collateral_token)?;
        dex.validate(input_swap, input_token, data.collateral_token)?;

        let premium_bps = self.settings.flash_loan_provider().premium_bps();
        let owed = safe_add(data.collateral_amount, calculate_premium(data.collateral_amount, premium_bps)?)?;
        let collateral_from_debt = dex.quote_exact_input(ledger, debt_collateral, data.debt_amount)?;
        let shortfall = owed.saturating_sub(collateral_from_debt);
        if input_token == data.collateral_token {
            return Ok(shortfall);
        }
        dex.quote_exact_output(ledger, input_swap, shortfall)
    }

    /// Estimated `output_token` received for redeeming `set_amount`
    pub fn get_redeem_exact_set(
        &self,
        ledger: &Ledger,
        set_token: Address,
        set_amount: Amount,
        output_token: Address,
        collateral_debt: &SwapData,
        output_swap: &SwapData,
    ) -> FlashMintResult<Amount> {
        let data = self.get_leveraged_token_data(ledger, set_token, set_amount, false)?;
        let dex = self.settings.dex();
        dex.validate(collateral_debt, data.collateral_token, data.debt_token)?;
        dex.validate(output_swap, data.collateral_token, output_token)?;

        let premium_bps = self.settings.flash_loan_provider().premium_bps();
        let owed = safe_add(data.debt_amount, calculate_premium(data.debt_amount, premium_bps)?)?;
        let collateral_for_debt = dex.quote_exact_output(ledger, collateral_debt, owed)?;
        let remaining = data.collateral_amount.saturating_sub(collateral_for_debt);
        dex.quote_exact_input(ledger, output_swap, remaining)
    }
}
