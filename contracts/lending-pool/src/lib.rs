//! Lending Pool Contract
//!
//! Aave-style money market used as the flash loan provider and as the
//! collateral wrapper of leveraged set tokens.
//!
//! ## Key Features
//!
//! - **aTokens**: deposits mint a 1:1 receipt token; the underlying is held
//!   at the aToken address
//! - **Variable debt**: borrows mint a non-transferable debt token to the borrower
//! - **Flash loans**: principal goes out, the receiver's callback runs, then
//!   principal plus premium is pulled back with `transfer_from`

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flashmint_common::{
    constants::{fees::FLASH_LOAN_PREMIUM_BPS, flash_loan::MODE_NO_DEBT},
    errors::{FlashMintError, FlashMintResult},
    events::FlashMintEvent,
    interfaces::{FlashLoanProvider, FlashLoanReceiver, FlashLoanRequest, LendingMarket},
    ledger::Ledger,
    math::{calculate_premium, safe_add},
    types::{Address, Amount},
};

// ============ Reserve Data ============

/// Tokens backing one listed asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReserveData {
    /// Receipt token; also the account holding the reserve's liquidity
    pub a_token: Address,
    /// Variable-rate debt token
    pub variable_debt_token: Address,
}

// ============ Lending Pool ============

/// Reference lending pool over the shared ledger
#[derive(Debug, Clone)]
pub struct LendingPool {
    address: Address,
    /// Flash loan premium in basis points
    premium_bps: u128,
    /// Underlying asset -> reserve
    reserves: BTreeMap<Address, ReserveData>,
}

impl LendingPool {
    pub fn new(address: Address) -> FlashMintResult<Self> {
        if address.is_zero() {
            return Err(FlashMintError::InvalidAddress {
                reason: "lending pool address cannot be zero",
            });
        }
        Ok(Self {
            address,
            premium_bps: FLASH_LOAN_PREMIUM_BPS,
            reserves: BTreeMap::new(),
        })
    }

    /// Overrides the default 9 bps flash loan premium
    pub fn with_premium_bps(mut self, premium_bps: u128) -> Self {
        self.premium_bps = premium_bps;
        self
    }

    /// Lists `underlying`, deriving its aToken and debt token addresses
    pub fn init_reserve(&mut self, underlying: Address) -> FlashMintResult<ReserveData> {
        if underlying.is_zero() || underlying.is_native() {
            return Err(FlashMintError::InvalidAddress {
                reason: "reserve asset must be an ERC-20",
            });
        }
        let pool = self.address;
        let reserve = *self.reserves.entry(underlying).or_insert_with(|| ReserveData {
            a_token: Address::derive_from(&[pool.as_bytes(), b"aToken", underlying.as_bytes()]),
            variable_debt_token: Address::derive_from(&[pool.as_bytes(), b"variableDebt", underlying.as_bytes()]),
        });
        Ok(reserve)
    }

    pub fn reserve(&self, underlying: Address) -> FlashMintResult<ReserveData> {
        self.reserves
            .get(&underlying)
            .copied()
            .ok_or(FlashMintError::InvalidInput {
                param: "asset",
                reason: "reserve not listed",
            })
    }

    pub fn a_token_of(&self, underlying: Address) -> FlashMintResult<Address> {
        Ok(self.reserve(underlying)?.a_token)
    }

    /// Outstanding variable debt of `account` in `underlying`
    pub fn debt_of(&self, ledger: &Ledger, underlying: Address, account: Address) -> FlashMintResult<Amount> {
        let reserve = self.reserve(underlying)?;
        Ok(ledger.balance_of(reserve.variable_debt_token, account))
    }

    /// Liquidity of `underlying` available to borrow or flash-borrow
    pub fn available_liquidity(&self, ledger: &Ledger, underlying: Address) -> FlashMintResult<Amount> {
        let reserve = self.reserve(underlying)?;
        Ok(ledger.balance_of(underlying, reserve.a_token))
    }

    fn ensure_liquidity(&self, ledger: &Ledger, underlying: Address, amount: Amount) -> FlashMintResult<ReserveData> {
        let reserve = self.reserve(underlying)?;
        if ledger.balance_of(underlying, reserve.a_token) < amount {
            return Err(FlashMintError::InsufficientLiquidity { pool: reserve.a_token });
        }
        Ok(reserve)
    }
}

impl LendingMarket for LendingPool {
    fn address(&self) -> Address {
        self.address
    }

    fn underlying_asset(&self, a_token: Address) -> FlashMintResult<Address> {
        self.reserves
            .iter()
            .find(|(_, reserve)| reserve.a_token == a_token)
            .map(|(underlying, _)| *underlying)
            .ok_or(FlashMintError::InvalidInput {
                param: "a_token",
                reason: "not an aToken of this pool",
            })
    }

    fn deposit(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        on_behalf_of: Address,
    ) -> FlashMintResult<()> {
        if amount == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        let reserve = self.reserve(asset)?;
        ledger.transfer_from(asset, self.address, caller, reserve.a_token, amount)?;
        ledger.mint(reserve.a_token, on_behalf_of, amount)?;
        debug!(%asset, %on_behalf_of, amount, "deposit");
        Ok(())
    }

    fn withdraw(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        to: Address,
    ) -> FlashMintResult<Amount> {
        let reserve = self.reserve(asset)?;
        let amount = if amount == Amount::MAX {
            ledger.balance_of(reserve.a_token, caller)
        } else {
            amount
        };
        if amount == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        let reserve = self.ensure_liquidity(ledger, asset, amount)?;
        ledger.burn(reserve.a_token, caller, amount)?;
        ledger.transfer(asset, reserve.a_token, to, amount)?;
        debug!(%asset, %to, amount, "withdraw");
        Ok(amount)
    }

    fn borrow(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        on_behalf_of: Address,
    ) -> FlashMintResult<()> {
        if amount == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        let reserve = self.ensure_liquidity(ledger, asset, amount)?;
        ledger.mint(reserve.variable_debt_token, on_behalf_of, amount)?;
        ledger.transfer(asset, reserve.a_token, caller, amount)?;
        debug!(%asset, %on_behalf_of, amount, "borrow");
        Ok(())
    }

    fn repay(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        on_behalf_of: Address,
    ) -> FlashMintResult<Amount> {
        let reserve = self.reserve(asset)?;
        let debt = ledger.balance_of(reserve.variable_debt_token, on_behalf_of);
        let repaid = amount.min(debt);
        if repaid == 0 {
            return Err(FlashMintError::ZeroAmount);
        }
        ledger.transfer_from(asset, self.address, caller, reserve.a_token, repaid)?;
        ledger.burn(reserve.variable_debt_token, on_behalf_of, repaid)?;
        debug!(%asset, %on_behalf_of, repaid, "repay");
        Ok(repaid)
    }
}

impl FlashLoanProvider for LendingPool {
    fn address(&self) -> Address {
        self.address
    }

    fn premium_bps(&self) -> u128 {
        self.premium_bps
    }

    fn flash_loan(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        receiver: &dyn FlashLoanReceiver,
        request: FlashLoanRequest,
    ) -> FlashMintResult<()> {
        // 1. Request shape
        if request.assets.is_empty()
            || request.assets.len() != request.amounts.len()
            || request.assets.len() != request.modes.len()
        {
            return Err(FlashMintError::InvalidInput {
                param: "flash loan",
                reason: "INCONSISTENT_FLASHLOAN_PARAMS",
            });
        }
        if request.modes.iter().any(|mode| *mode != MODE_NO_DEBT) {
            return Err(FlashMintError::FlashLoanFailed {
                reason: "only mode 0 loans are supported",
            });
        }

        // 2. Send principal, record premiums
        let receiver_address = receiver.address();
        let mut premiums = Vec::with_capacity(request.assets.len());
        for (asset, amount) in request.assets.iter().zip(&request.amounts) {
            if *amount == 0 {
                return Err(FlashMintError::ZeroAmount);
            }
            let reserve = self.ensure_liquidity(ledger, *asset, *amount)?;
            let premium = calculate_premium(*amount, self.premium_bps)?;
            ledger.transfer(*asset, reserve.a_token, receiver_address, *amount)?;
            ledger.emit(FlashMintEvent::FlashLoan {
                receiver: receiver_address,
                initiator: caller,
                asset: *asset,
                amount: *amount,
                premium,
            });
            premiums.push(premium);
        }

        // 3. Receiver callback
        let ok = receiver.execute_operation(
            ledger,
            self.address,
            &request.assets,
            &request.amounts,
            &premiums,
            caller,
            &request.params,
        )?;
        if !ok {
            return Err(FlashMintError::FlashLoanFailed {
                reason: "INVALID_FLASH_LOAN_EXECUTOR_RETURN",
            });
        }

        // 4. Pull back principal plus premium
        for ((asset, amount), premium) in request.assets.iter().zip(&request.amounts).zip(&premiums) {
            let reserve = self.reserve(*asset)?;
            let owed = safe_add(*amount, *premium)?;
            ledger.transfer_from(*asset, self.address, receiver_address, reserve.a_token, owed)?;
            info!(%asset, amount, premium, receiver = %receiver_address, "flash loan repaid");
        }
        Ok(())
    }
}
