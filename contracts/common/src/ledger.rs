//! Transactional Ledger
//!
//! In-memory chain state shared by the exchange issuance contract and its
//! collaborators: token balances, allowances, total supplies and the event
//! log. Native ETH is tracked as a balance under `ETH_ADDRESS`.
//!
//! ## Key Features
//!
//! - **ERC-20 semantics**: `transfer`, `transfer_from` with allowance
//!   checks, `approve`, and infinite allowances that are never decremented
//! - **Atomic transactions**: `transact` checkpoints the whole state and
//!   restores it when the closure fails, events included
//! - **Comparable snapshots**: `Ledger` is `Clone + Eq`, so a caller can
//!   assert that a failed call left every balance untouched

use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::constants::token::MAX_ALLOWANCE;
use crate::errors::{FlashMintError, FlashMintResult};
use crate::events::{EventLog, FlashMintEvent};
use crate::math::{safe_add, safe_sub};
use crate::types::{Address, Amount, ETH_ADDRESS};

/// Chain state for one simulated network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    /// (token, holder) -> balance
    balances: BTreeMap<(Address, Address), Amount>,
    /// (token, owner, spender) -> allowance
    allowances: BTreeMap<(Address, Address, Address), Amount>,
    /// token -> total supply
    supplies: BTreeMap<Address, Amount>,
    /// Events emitted by committed calls
    events: EventLog,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Views ============

    /// Balance of `holder` in `token`
    pub fn balance_of(&self, token: Address, holder: Address) -> Amount {
        self.balances.get(&(token, holder)).copied().unwrap_or(0)
    }

    /// Native ETH balance of `holder`
    pub fn native_balance(&self, holder: Address) -> Amount {
        self.balance_of(ETH_ADDRESS, holder)
    }

    /// Amount `spender` may pull from `owner`
    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self, token: Address) -> Amount {
        self.supplies.get(&token).copied().unwrap_or(0)
    }

    /// Events emitted so far
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ============ Supply ============

    /// Creates `amount` of `token` for `to`
    pub fn mint(&mut self, token: Address, to: Address, amount: Amount) -> FlashMintResult<()> {
        if to.is_zero() {
            return Err(FlashMintError::InvalidAddress {
                reason: "cannot mint to the zero address",
            });
        }
        let supply = safe_add(self.total_supply(token), amount)?;
        let balance = safe_add(self.balance_of(token, to), amount)?;
        self.supplies.insert(token, supply);
        self.set_balance(token, to, balance);
        trace!(%token, %to, amount, "mint");
        Ok(())
    }

    /// Destroys `amount` of `token` held by `from`
    pub fn burn(&mut self, token: Address, from: Address, amount: Amount) -> FlashMintResult<()> {
        let balance = self.debit(token, from, amount)?;
        let supply = safe_sub(self.total_supply(token), amount)?;
        self.supplies.insert(token, supply);
        self.set_balance(token, from, balance);
        trace!(%token, %from, amount, "burn");
        Ok(())
    }

    // ============ Transfers ============

    /// Moves `amount` of `token` from `from` to `to`
    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> FlashMintResult<()> {
        if to.is_zero() {
            return Err(FlashMintError::InvalidAddress {
                reason: "cannot transfer to the zero address",
            });
        }
        let from_balance = self.debit(token, from, amount)?;
        self.set_balance(token, from, from_balance);
        let to_balance = safe_add(self.balance_of(token, to), amount)?;
        self.set_balance(token, to, to_balance);
        trace!(%token, %from, %to, amount, "transfer");
        Ok(())
    }

    /// Pulls `amount` of `token` from `from` on behalf of `spender`
    ///
    /// Consumes allowance unless it is `MAX_ALLOWANCE` or the spender moves
    /// its own funds.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> FlashMintResult<()> {
        if spender == from {
            return self.transfer(token, from, to, amount);
        }
        let allowed = self.allowance(token, from, spender);
        if allowed < amount {
            return Err(FlashMintError::InsufficientAllowance {
                token,
                owner: from,
                spender,
                available: allowed,
                requested: amount,
            });
        }
        self.transfer(token, from, to, amount)?;
        if allowed != MAX_ALLOWANCE {
            self.approve(token, from, spender, allowed - amount);
        }
        Ok(())
    }

    /// Sets the allowance of `spender` over `owner`'s `token`
    pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(token, owner, spender));
        } else {
            self.allowances.insert((token, owner, spender), amount);
        }
    }

    // ============ Events ============

    pub fn emit(&mut self, event: FlashMintEvent) {
        self.events.emit(event);
    }

    // ============ Atomicity ============

    /// Runs `f` as one atomic transaction
    ///
    /// On error every balance, allowance, supply and event written inside
    /// `f` is discarded and the error is returned unchanged.
    pub fn transact<T, F>(&mut self, f: F) -> FlashMintResult<T>
    where
        F: FnOnce(&mut Ledger) -> FlashMintResult<T>,
    {
        let checkpoint = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(code = err.code(), error = %err, "transaction reverted");
                *self = checkpoint;
                Err(err)
            }
        }
    }

    // ============ Internal ============

    fn debit(&self, token: Address, holder: Address, amount: Amount) -> FlashMintResult<Amount> {
        let available = self.balance_of(token, holder);
        available
            .checked_sub(amount)
            .ok_or(FlashMintError::InsufficientBalance {
                token,
                holder,
                available,
                requested: amount,
            })
    }

    fn set_balance(&mut self, token: Address, holder: Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&(token, holder));
        } else {
            self.balances.insert((token, holder), amount);
        }
    }
}
