//! Flash-Loan Orchestrator
//!
//! Requests the single-asset loan a settlement needs and receives the
//! provider's callback. The callback is authorized before it touches any
//! balance: it must come from the configured lending pool, for a loan this
//! zap initiated, while that loan is the one in flight.

use tracing::{debug, warn};

use flashmint_common::{
    constants::flash_loan::MODE_NO_DEBT,
    errors::{FlashMintError, FlashMintResult, SettlementStage},
    interfaces::{FlashLoanReceiver, FlashLoanRequest},
    ledger::Ledger,
    types::{Address, Amount},
};

use crate::context::{FlashLoanContext, LoanPhase, PhaseGuard};
use crate::ExchangeIssuanceLeveraged;

impl ExchangeIssuanceLeveraged {
    /// Borrows `amount` of `asset` and settles `context` inside the callback
    ///
    /// Returns the amount the settlement reported: input spent on issue,
    /// output received on redeem.
    pub(crate) fn initiate_flash_loan(
        &self,
        ledger: &mut Ledger,
        asset: Address,
        amount: Amount,
        context: &FlashLoanContext,
    ) -> FlashMintResult<Amount> {
        let guard = PhaseGuard::begin(&self.phase)?;
        let request = FlashLoanRequest {
            assets: vec![asset],
            amounts: vec![amount],
            modes: vec![MODE_NO_DEBT],
            on_behalf_of: self.address,
            params: context.encode()?,
            referral_code: 0,
        };
        debug!(%asset, amount, is_issuance = context.is_issuance, "requesting flash loan");

        self.settings
            .flash_loan_provider()
            .flash_loan(ledger, self.address, self, request)
            .map_err(|e| e.in_stage(SettlementStage::FlashLoan))?;

        match guard.phase() {
            LoanPhase::Settled(result) => Ok(result),
            _ => Err(FlashMintError::FlashLoanFailed {
                reason: "provider returned without running the callback",
            }),
        }
    }
}

impl FlashLoanReceiver for ExchangeIssuanceLeveraged {
    fn address(&self) -> Address {
        self.address
    }

    fn execute_operation(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        assets: &[Address],
        amounts: &[Amount],
        premiums: &[Amount],
        initiator: Address,
        params: &[u8],
    ) -> FlashMintResult<bool> {
        let lending_pool = self.settings.config().lending_pool;
        if caller != lending_pool {
            warn!(%caller, %lending_pool, "flash loan callback from unexpected caller");
            return Err(FlashMintError::LendingPoolOnly { caller });
        }
        if initiator != self.address {
            warn!(%initiator, zap = %self.address, "flash loan not initiated by this zap");
            return Err(FlashMintError::InvalidFlashLoanInitiator { initiator });
        }
        if self.phase.get() != LoanPhase::LoanRequested {
            warn!(phase = ?self.phase.get(), "flash loan callback without a pending request");
            return Err(FlashMintError::UnexpectedCallback);
        }
        self.phase.set(LoanPhase::Settling);
        let ([asset], [amount], [premium]) = (assets, amounts, premiums) else {
            return Err(FlashMintError::InvalidInput {
                param: "flash loan",
                reason: "exactly one asset expected",
            });
        };
        let context = FlashLoanContext::decode(params)?;

        let result = if context.is_issuance {
            self.settle_mint(ledger, &context, *asset, *amount, *premium)?
        } else {
            self.settle_redeem(ledger, &context, *asset, *amount, *premium)?
        };
        self.phase.set(LoanPhase::Settled(result));
        Ok(true)
    }
}
