//! Token Approvals
//!
//! Standing allowances the zap grants to its collaborators. Settlement
//! never approves on the fly for the issuance module or the lending pool;
//! a set token must be approved once before it can be issued or redeemed.

use tracing::{debug, warn};

use flashmint_common::{
    constants::{precision::PRECISE_UNIT, token::MAX_ALLOWANCE},
    errors::{FlashMintError, FlashMintResult},
    events::FlashMintEvent,
    ledger::Ledger,
    types::Address,
};

use crate::calculator::{get_leveraged_token_data, LeveragedTokenData};
use crate::ExchangeIssuanceLeveraged;

impl ExchangeIssuanceLeveraged {
    /// Grants `spender` a MAX allowance over the zap's `token`
    pub fn approve_token(&self, ledger: &mut Ledger, token: Address, spender: Address) -> FlashMintResult<()> {
        if token.is_zero() || token.is_native() || spender.is_zero() {
            return Err(FlashMintError::InvalidAddress {
                reason: "approval needs an ERC-20 token and a nonzero spender",
            });
        }
        ledger.approve(token, self.address, spender, MAX_ALLOWANCE);
        debug!(%token, %spender, "token approved");
        Ok(())
    }

    pub fn approve_tokens(&self, ledger: &mut Ledger, tokens: &[Address], spender: Address) -> FlashMintResult<()> {
        ledger.transact(|ledger| {
            for token in tokens {
                self.approve_token(ledger, *token, spender)?;
            }
            Ok(())
        })
    }

    /// Approves every token a settlement of `set_token` moves
    ///
    /// The issuance module gets the collateral aToken and the debt token,
    /// the lending pool gets the underlying collateral and the debt token.
    /// Calling it again leaves every allowance at MAX.
    pub fn approve_set_token(&self, ledger: &mut Ledger, set_token: Address) -> FlashMintResult<()> {
        ledger.transact(|ledger| {
            let data = get_leveraged_token_data(&self.settings, ledger, set_token, PRECISE_UNIT, true)?;
            let module = self.settings.issuance_module().address();
            let pool = self.settings.lending_market().address();

            self.approve_token(ledger, data.collateral_a_token, module)?;
            self.approve_token(ledger, data.debt_token, module)?;
            self.approve_token(ledger, data.collateral_token, pool)?;
            self.approve_token(ledger, data.debt_token, pool)?;

            ledger.emit(FlashMintEvent::SetTokenApproved { set_token });
            Ok(())
        })
    }

    /// Fails with `SetTokenNotApproved` unless every allowance
    /// `approve_set_token` grants covers what this settlement moves
    pub(crate) fn require_set_token_approved(
        &self,
        ledger: &Ledger,
        set_token: Address,
        data: &LeveragedTokenData,
    ) -> FlashMintResult<()> {
        let module = self.settings.issuance_module().address();
        let pool = self.settings.lending_market().address();
        let required = [
            (data.collateral_a_token, module, data.collateral_amount),
            (data.debt_token, module, data.debt_amount),
            (data.collateral_token, pool, data.collateral_amount),
            (data.debt_token, pool, data.debt_amount),
        ];
        for (token, spender, amount) in required {
            if ledger.allowance(token, self.address, spender) < amount {
                warn!(%set_token, %token, %spender, "set token not approved");
                return Err(FlashMintError::SetTokenNotApproved { set_token });
            }
        }
        Ok(())
    }
}
