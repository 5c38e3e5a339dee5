//! Core Types
//!
//! Account identifiers and amount aliases used across every contract in
//! the workspace.

use core::fmt;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::errors::FlashMintError;

/// Token amount in base units
pub type Amount = u128;

/// Sentinel used for native ETH in swap paths and as input/output token
pub const ETH_ADDRESS: Address = Address([0xEE; 20]);

/// 20-byte account identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wraps raw bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the address
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// True for the native ETH sentinel
    pub fn is_native(&self) -> bool {
        *self == ETH_ADDRESS
    }

    /// Deterministic address for a human-readable label
    ///
    /// Takes the last 20 bytes of `sha256(label)`, the same truncation the
    /// EVM applies to a hashed public key.
    pub fn derive(label: &str) -> Self {
        Self::derive_from(&[label.as_bytes()])
    }

    /// Deterministic address for a sequence of byte strings
    ///
    /// Used for pool and pair addresses keyed by their factory and tokens.
    pub fn derive_from(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = FlashMintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(digits).map_err(|_| FlashMintError::InvalidAddress {
            reason: "address is not valid hex",
        })?;
        let bytes: [u8; 20] = decoded.try_into().map_err(|_| FlashMintError::InvalidAddress {
            reason: "address must be 20 bytes",
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <String as Deserialize>::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
