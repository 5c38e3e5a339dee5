//! Collaborator Interfaces
//!
//! Traits for the external protocols the exchange issuance contract drives:
//! the set token controller and issuance module, the lending market with
//! its flash loans, and the wrapped native token. Every call names the
//! acting `caller` explicitly and threads the shared `Ledger` through, so a
//! whole settlement runs as one synchronous call chain.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::errors::FlashMintResult;
use crate::ledger::Ledger;
use crate::types::{Address, Amount};

// ============ Set Protocol ============

/// Registry of valid set tokens
pub trait SetController {
    fn address(&self) -> Address;

    /// True if `token` was created by this controller
    fn is_set(&self, token: Address) -> bool;
}

/// Component amounts a quantity of set token requires (issue) or returns (redeem)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComponentUnits {
    /// Component tokens, in position order
    pub components: Vec<Address>,
    /// Equity amount per component (supplied on issue, returned on redeem)
    pub equity_units: Vec<Amount>,
    /// Debt amount per component (handed out on issue, owed on redeem)
    pub debt_units: Vec<Amount>,
}

impl ComponentUnits {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Issuance module for set tokens with debt positions
pub trait IssuanceModule {
    fn address(&self) -> Address;

    /// Amounts `quantity` of `set_token` requires at issuance, rounded the
    /// way `issue` will move them
    fn required_component_issuance_units(
        &self,
        ledger: &Ledger,
        set_token: Address,
        quantity: Amount,
    ) -> FlashMintResult<ComponentUnits>;

    /// Amounts `quantity` of `set_token` returns at redemption, rounded the
    /// way `redeem` will move them
    fn required_component_redemption_units(
        &self,
        ledger: &Ledger,
        set_token: Address,
        quantity: Amount,
    ) -> FlashMintResult<ComponentUnits>;

    /// Pulls equity from `caller`, mints `quantity` to `to`, sends debt to `caller`
    fn issue(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        quantity: Amount,
        to: Address,
    ) -> FlashMintResult<()>;

    /// Burns `quantity` from `caller`, pulls debt from `caller`, sends equity to `to`
    fn redeem(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        set_token: Address,
        quantity: Amount,
        to: Address,
    ) -> FlashMintResult<()>;
}

// ============ Lending Market ============

/// Aave-style lending market
pub trait LendingMarket {
    fn address(&self) -> Address;

    /// Underlying asset of an interest-bearing aToken
    fn underlying_asset(&self, a_token: Address) -> FlashMintResult<Address>;

    /// Pulls `amount` of `asset` from `caller` and mints aTokens to `on_behalf_of`
    fn deposit(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        on_behalf_of: Address,
    ) -> FlashMintResult<()>;

    /// Burns `caller`'s aTokens and sends the underlying to `to`
    ///
    /// `Amount::MAX` withdraws the whole balance. Returns the amount withdrawn.
    fn withdraw(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        to: Address,
    ) -> FlashMintResult<Amount>;

    /// Opens variable debt for `on_behalf_of` and sends `amount` to `caller`
    fn borrow(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        on_behalf_of: Address,
    ) -> FlashMintResult<()>;

    /// Repays `on_behalf_of`'s debt with `caller`'s funds, returns the amount repaid
    fn repay(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: Amount,
        on_behalf_of: Address,
    ) -> FlashMintResult<Amount>;
}

/// Parameters of a flash loan request
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FlashLoanRequest {
    /// Assets to borrow
    pub assets: Vec<Address>,
    /// Amount per asset
    pub amounts: Vec<Amount>,
    /// Debt mode per asset, 0 repays within the call
    pub modes: Vec<u8>,
    /// Account that would carry any opened debt
    pub on_behalf_of: Address,
    /// Opaque data handed back to the receiver
    pub params: Vec<u8>,
    pub referral_code: u16,
}

/// Lender of uncollateralized same-call loans
pub trait FlashLoanProvider {
    fn address(&self) -> Address;

    /// Premium charged per loan, in basis points of the borrowed amount
    fn premium_bps(&self) -> u128;

    /// Sends the assets to `receiver`, invokes its callback with `caller` as
    /// initiator, then pulls back principal plus premium
    fn flash_loan(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        receiver: &dyn FlashLoanReceiver,
        request: FlashLoanRequest,
    ) -> FlashMintResult<()>;
}

/// Contract able to receive a flash loan
pub trait FlashLoanReceiver {
    fn address(&self) -> Address;

    /// Called by the provider after the loan is sent
    ///
    /// `caller` is the provider itself, `initiator` the account that
    /// requested the loan. Returning `Ok(false)` aborts the loan.
    fn execute_operation(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        assets: &[Address],
        amounts: &[Amount],
        premiums: &[Amount],
        initiator: Address,
        params: &[u8],
    ) -> FlashMintResult<bool>;
}

// ============ Wrapped Native ============

/// WETH-style wrapper around the native asset
pub trait WrappedNative {
    fn address(&self) -> Address;

    /// Moves `amount` of native ETH from `caller` and mints the same in WETH
    fn deposit(&self, ledger: &mut Ledger, caller: Address, amount: Amount) -> FlashMintResult<()>;

    /// Burns `amount` of `caller`'s WETH and returns native ETH
    fn withdraw(&self, ledger: &mut Ledger, caller: Address, amount: Amount) -> FlashMintResult<()>;
}
