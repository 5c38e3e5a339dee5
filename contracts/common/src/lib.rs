//! Flash-Mint Common Library
//!
//! Shared types, constants, and utilities for the leveraged exchange
//! issuance contracts and their reference collaborators.
//!
//! ## Execution Model
//!
//! Contracts are plain Rust values that act on a shared [`Ledger`]:
//! - **Account balances**: ERC-20 style balances and allowances per token
//! - **Synchronous calls**: a flash loan callback runs inside the lender's call
//! - **Atomicity**: [`Ledger::transact`] restores every write when a call fails
//!
//! ## Modules
//!
//! - **Types**: 20-byte addresses, amounts, the native ETH sentinel
//! - **Errors**: one error enum with stable codes and settlement stage tags
//! - **Events**: issue/redeem audit trail, rolled back with the ledger
//! - **Math**: checked and 1e18 fixed-point arithmetic with 256-bit intermediates
//! - **Interfaces**: issuance module, lending market, flash loans, WETH
//! - **Access Control**: owner and operator roles

#![allow(clippy::too_many_arguments)]

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod ledger;
pub mod interfaces;
pub mod access_control;
pub mod weth;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use ledger::Ledger;
pub use interfaces::*;
pub use access_control::*;
pub use weth::Weth9;
