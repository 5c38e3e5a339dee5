//! Wrapped Ether
//!
//! WETH9 over the ledger: native ETH deposited is held by the WETH address
//! and an equal amount of the WETH token is minted to the depositor.

use tracing::trace;

use crate::errors::{FlashMintError, FlashMintResult};
use crate::interfaces::WrappedNative;
use crate::ledger::Ledger;
use crate::types::{Address, Amount, ETH_ADDRESS};

/// WETH9 token contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weth9 {
    address: Address,
}

impl Weth9 {
    pub fn new(address: Address) -> FlashMintResult<Self> {
        if address.is_zero() || address.is_native() {
            return Err(FlashMintError::InvalidAddress {
                reason: "weth address cannot be zero or the native sentinel",
            });
        }
        Ok(Self { address })
    }
}

impl WrappedNative for Weth9 {
    fn address(&self) -> Address {
        self.address
    }

    fn deposit(&self, ledger: &mut Ledger, caller: Address, amount: Amount) -> FlashMintResult<()> {
        ledger.transfer(ETH_ADDRESS, caller, self.address, amount)?;
        ledger.mint(self.address, caller, amount)?;
        trace!(%caller, amount, "weth deposit");
        Ok(())
    }

    fn withdraw(&self, ledger: &mut Ledger, caller: Address, amount: Amount) -> FlashMintResult<()> {
        ledger.burn(self.address, caller, amount)?;
        ledger.transfer(ETH_ADDRESS, self.address, caller, amount)?;
        trace!(%caller, amount, "weth withdraw");
        Ok(())
    }
}
