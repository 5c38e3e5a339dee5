//! Flash Loan Context
//!
//! Everything the callback needs to finish a settlement travels through the
//! loan's opaque `params` as a borsh-encoded [`FlashLoanContext`]. The
//! [`LoanPhase`] machine ties each callback to exactly one request.

use std::cell::Cell;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use flashmint_common::{
    errors::{FlashMintError, FlashMintResult},
    types::{Address, Amount},
};
use flashmint_dex_adapter::SwapData;

/// Settlement instructions carried through the flash loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FlashLoanContext {
    pub is_issuance: bool,
    pub set_token: Address,
    pub set_amount: Amount,
    /// Account that called the entry point
    pub original_sender: Address,
    /// Max input on issue, min output on redeem
    pub limit_amount: Amount,
    /// Input token on issue, output token on redeem; `ETH_ADDRESS` for native
    pub payment_token: Address,
    /// Debt -> collateral on issue, collateral -> debt on redeem
    pub swap_data_debt_collateral: SwapData,
    /// Input -> collateral on issue, collateral -> output on redeem
    pub swap_data_input_output: SwapData,
}

impl FlashLoanContext {
    pub fn encode(&self) -> FlashMintResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|e| FlashMintError::CallbackDecode { reason: e.to_string() })
    }

    pub fn decode(params: &[u8]) -> FlashMintResult<Self> {
        borsh::from_slice(params).map_err(|e| FlashMintError::CallbackDecode { reason: e.to_string() })
    }
}

/// Where the zap is in its single in-flight loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanPhase {
    #[default]
    Idle,
    /// Loan requested, callback not yet run
    LoanRequested,
    /// Callback running; a second callback is rejected
    Settling,
    /// Callback finished; carries the amount spent or received
    Settled(Amount),
}

/// Resets the phase to `Idle` when dropped
pub(crate) struct PhaseGuard<'a> {
    phase: &'a Cell<LoanPhase>,
}

impl<'a> PhaseGuard<'a> {
    /// Moves `Idle` to `LoanRequested`, rejecting a second loan in flight
    pub(crate) fn begin(phase: &'a Cell<LoanPhase>) -> FlashMintResult<Self> {
        if phase.get() != LoanPhase::Idle {
            return Err(FlashMintError::NestedFlashLoan);
        }
        phase.set(LoanPhase::LoanRequested);
        Ok(Self { phase })
    }

    pub(crate) fn phase(&self) -> LoanPhase {
        self.phase.get()
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.set(LoanPhase::Idle);
    }
}
