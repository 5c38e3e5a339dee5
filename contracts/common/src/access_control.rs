//! Access Control Module
//!
//! Role-based authorization for privileged configuration changes.
//!
//! ## Key Features
//!
//! - **Owner**: fixed at construction, may grant and revoke operators
//! - **Operator**: may replace router and collaborator configuration
//! - **Priority ordering**: a higher role satisfies any lower requirement

use std::collections::BTreeSet;

use crate::errors::{FlashMintError, FlashMintResult};
use crate::types::Address;

// ============================================================================
// Types
// ============================================================================

/// Privileged roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    /// Contract owner - manages operators
    Owner,
    /// Operator - reconfigures routers and collaborators
    Operator,
}

impl Role {
    /// Get role priority (higher = more powerful)
    pub fn priority(&self) -> u8 {
        match self {
            Role::Owner => 100,
            Role::Operator => 50,
        }
    }
}

/// Role assignments of one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlState {
    /// Owner address
    pub owner: Address,
    /// Addresses holding the operator role
    pub operators: BTreeSet<Address>,
}

impl AccessControlState {
    /// Create new access control state with an owner
    pub fn new(owner: Address) -> FlashMintResult<Self> {
        if owner.is_zero() {
            return Err(FlashMintError::InvalidAddress {
                reason: "owner cannot be zero address",
            });
        }
        Ok(Self {
            owner,
            operators: BTreeSet::new(),
        })
    }
}

// ============================================================================
// Core Access Control Functions
// ============================================================================

/// Highest role held by `address`, if any
pub fn role_of(state: &AccessControlState, address: &Address) -> Option<Role> {
    if *address == state.owner {
        Some(Role::Owner)
    } else if state.operators.contains(address) {
        Some(Role::Operator)
    } else {
        None
    }
}

/// Check if address holds `role` or a more powerful one
pub fn has_role(state: &AccessControlState, address: &Address, role: Role) -> bool {
    role_of(state, address).is_some_and(|held| held.priority() >= role.priority())
}

/// Fails with `Unauthorized` unless `caller` holds `role`
pub fn require_role(state: &AccessControlState, caller: Address, role: Role) -> FlashMintResult<()> {
    if has_role(state, &caller, role) {
        Ok(())
    } else {
        Err(FlashMintError::Unauthorized {
            expected: state.owner,
            actual: caller,
        })
    }
}

/// Grant the operator role
pub fn grant_operator(
    state: &mut AccessControlState,
    granter: Address,
    grantee: Address,
) -> FlashMintResult<()> {
    require_role(state, granter, Role::Owner)?;
    if grantee.is_zero() {
        return Err(FlashMintError::InvalidAddress {
            reason: "operator cannot be zero address",
        });
    }
    state.operators.insert(grantee);
    Ok(())
}

/// Revoke the operator role
pub fn revoke_operator(
    state: &mut AccessControlState,
    revoker: Address,
    target: Address,
) -> FlashMintResult<()> {
    require_role(state, revoker, Role::Owner)?;
    state.operators.remove(&target);
    Ok(())
}
