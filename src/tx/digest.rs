//! Digest derivation
//!
//! What every signer signs: `blake2b-256(intent || bytes)`. The 3-byte
//! intent is `(scope, version, app_id)`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{ProgrammableTransaction, UnsignedTransaction};
use crate::error::{StepSignError, StepSignResult};
use crate::sui::crypto::blake2b256;

/// Intent framing bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub scope: u8,
    pub version: u8,
    pub app_id: u8,
}

impl Intent {
    /// Full transaction data, the framing validators check
    pub const fn transaction_data() -> Self {
        Self {
            scope: 0,
            version: 0,
            app_id: 0,
        }
    }

    /// Personal-message framing used for out-of-band signatures that are
    /// passed to the contract as arguments
    pub const fn personal_message() -> Self {
        Self {
            scope: 3,
            version: 0,
            app_id: 0,
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.scope, self.version, self.app_id]
    }
}

/// 32-byte digest handed to signers
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionDigest([u8; 32]);

impl TransactionDigest {
    pub const LEN: usize = 32;

    pub fn of_intent_message(intent: Intent, bytes: &[u8]) -> Self {
        Self(blake2b256(&[&intent.to_bytes(), bytes]))
    }

    /// Digest of the full `TransactionData` (multisig sender flow)
    pub fn of_transaction(tx: &UnsignedTransaction) -> Self {
        Self::of_intent_message(Intent::transaction_data(), &tx.to_bytes())
    }

    /// Digest of the transaction kind alone, for signatures embedded in
    /// the call's own arguments
    pub fn of_kind(tx: &UnsignedTransaction) -> Self {
        Self::of_programmable(tx.kind())
    }

    /// Same as [`of_kind`](Self::of_kind) for a kind built without gas data
    pub fn of_programmable(kind: &ProgrammableTransaction) -> Self {
        Self::of_intent_message(Intent::personal_message(), &kind.to_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> StepSignResult<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            StepSignError::invalid_input(format!("Digest must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionDigest({})", self.to_hex())
    }
}

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for TransactionDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
