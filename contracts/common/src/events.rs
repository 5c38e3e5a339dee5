//! Protocol Events
//!
//! Events are the durable audit trail of a settlement. They are collected in
//! the ledger's `EventLog` and rolled back together with balances when a
//! transaction reverts, so a log entry always describes a completed call.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Exchange issuance events (0x01 - 0x1F)
    ExchangeIssue = 0x01,
    ExchangeRedeem = 0x02,
    SetTokenApproved = 0x03,

    // Lending events (0x20 - 0x3F)
    FlashLoan = 0x20,

    // Admin events (0x80 - 0x9F)
    ConfigUpdated = 0x80,
}

/// Main event enum containing all possible events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum FlashMintEvent {
    // ============ Exchange Issuance Events ============

    /// Emitted when a leveraged token is minted from an arbitrary input token
    ExchangeIssue {
        caller: Address,
        set_token: Address,
        input_token: Address,
        amount_spent: Amount,
        set_amount: Amount,
    },

    /// Emitted when a leveraged token is redeemed for an arbitrary output token
    ExchangeRedeem {
        caller: Address,
        set_token: Address,
        output_token: Address,
        set_amount: Amount,
        amount_received: Amount,
    },

    /// Emitted when component allowances for a set token are granted
    SetTokenApproved { set_token: Address },

    // ============ Lending Events ============

    /// Emitted by the lending pool for every flash-borrowed asset
    FlashLoan {
        receiver: Address,
        initiator: Address,
        asset: Address,
        amount: Amount,
        premium: Amount,
    },

    // ============ Admin Events ============

    /// Emitted when the operator replaces the router configuration
    ConfigUpdated { operator: Address },
}

impl FlashMintEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ExchangeIssue { .. } => EventType::ExchangeIssue,
            Self::ExchangeRedeem { .. } => EventType::ExchangeRedeem,
            Self::SetTokenApproved { .. } => EventType::SetTokenApproved,
            Self::FlashLoan { .. } => EventType::FlashLoan,
            Self::ConfigUpdated { .. } => EventType::ConfigUpdated,
        }
    }

    /// Borsh encoding, as an indexer would store the log entry
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Events committed to a ledger, in emission order
///
/// The log is part of ledger state, so a reverted transaction drops the
/// events it emitted along with its balance changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<FlashMintEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: FlashMintEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[FlashMintEvent] {
        &self.events
    }

    /// Events of one kind, oldest first
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&FlashMintEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events.iter().filter(|e| e.event_type() == event_type).count()
    }

    pub fn last(&self) -> Option<&FlashMintEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
