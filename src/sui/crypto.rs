//! Signature schemes, public keys and hashing
//!
//! Serialized signatures follow the network convention of a one-byte scheme
//! flag followed by the scheme payload.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as BlakeDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StepSignError, StepSignResult};
use crate::sui::address::SuiAddress;

pub type Blake2b256 = Blake2b<U32>;

/// Blake2b with a 32-byte output (not a truncated Blake2b-512)
pub fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Signature scheme flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    Ed25519,
    MultiSig,
    ZkLogin,
}

impl SignatureScheme {
    pub fn flag(self) -> u8 {
        match self {
            SignatureScheme::Ed25519 => 0x00,
            SignatureScheme::MultiSig => 0x03,
            SignatureScheme::ZkLogin => 0x05,
        }
    }

    pub fn from_flag(flag: u8) -> StepSignResult<Self> {
        match flag {
            0x00 => Ok(SignatureScheme::Ed25519),
            0x03 => Ok(SignatureScheme::MultiSig),
            0x05 => Ok(SignatureScheme::ZkLogin),
            other => Err(StepSignError::parse_error(format!(
                "Unsupported signature scheme flag {:#04x}",
                other
            ))),
        }
    }
}

/// Public key of a multisig member
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "bytes", rename_all = "snake_case")]
pub enum PublicKey {
    Ed25519([u8; 32]),
    /// zkLogin public identifier: `iss_len || iss || address_seed`
    ZkLogin(Vec<u8>),
}

impl PublicKey {
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            PublicKey::Ed25519(_) => SignatureScheme::Ed25519,
            PublicKey::ZkLogin(_) => SignatureScheme::ZkLogin,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(bytes) => bytes,
            PublicKey::ZkLogin(bytes) => bytes,
        }
    }

    /// Build the zkLogin identifier from issuer and the decimal address seed
    pub fn zklogin(iss: &str, address_seed: &[u8; 32]) -> StepSignResult<Self> {
        let iss_len = u8::try_from(iss.len())
            .map_err(|_| StepSignError::invalid_input("Issuer too long for zkLogin identifier"))?;
        let mut bytes = Vec::with_capacity(1 + iss.len() + 32);
        bytes.push(iss_len);
        bytes.extend_from_slice(iss.as_bytes());
        bytes.extend_from_slice(address_seed);
        Ok(PublicKey::ZkLogin(bytes))
    }

    /// Parse `ed25519:<hex>` or `zklogin:<hex>`
    pub fn parse(s: &str) -> StepSignResult<Self> {
        let (scheme, body) = s
            .split_once(':')
            .ok_or_else(|| StepSignError::invalid_input("Public key must be <scheme>:<hex>"))?;
        let bytes = hex::decode(body.trim_start_matches("0x"))?;
        match scheme {
            "ed25519" => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| StepSignError::invalid_input("Ed25519 public key must be 32 bytes"))?;
                Ok(PublicKey::Ed25519(arr))
            }
            "zklogin" => Ok(PublicKey::ZkLogin(bytes)),
            other => Err(StepSignError::invalid_input(format!(
                "Unknown public key scheme '{}'",
                other
            ))),
        }
    }

    /// `flag || key bytes`, the form hashed into addresses
    pub fn flagged_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.as_bytes().len());
        out.push(self.scheme().flag());
        out.extend_from_slice(self.as_bytes());
        out
    }

    /// Single-signer address: `blake2b256(flag || key)`
    pub fn to_address(&self) -> SuiAddress {
        SuiAddress::new(blake2b256(&[&self.flagged_bytes()]))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKey::Ed25519(b) => write!(f, "Ed25519({})", hex::encode(b)),
            PublicKey::ZkLogin(b) => write!(f, "ZkLogin({})", hex::encode(b)),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKey::Ed25519(b) => write!(f, "ed25519:{}", hex::encode(b)),
            PublicKey::ZkLogin(b) => write!(f, "zklogin:{}", hex::encode(b)),
        }
    }
}

/// A scheme-flagged signature as accepted by the network
#[derive(Clone, PartialEq, Eq)]
pub struct SerializedSignature(pub Vec<u8>);

impl SerializedSignature {
    pub const ED25519_LEN: usize = 1 + 64 + 32;

    /// `0x00 || signature || public_key`
    pub fn ed25519(signature: &[u8; 64], public_key: &[u8; 32]) -> Self {
        let mut bytes = Vec::with_capacity(Self::ED25519_LEN);
        bytes.push(SignatureScheme::Ed25519.flag());
        bytes.extend_from_slice(signature);
        bytes.extend_from_slice(public_key);
        Self(bytes)
    }

    pub fn scheme(&self) -> StepSignResult<SignatureScheme> {
        let flag = self
            .0
            .first()
            .copied()
            .ok_or_else(|| StepSignError::parse_error("Empty signature"))?;
        SignatureScheme::from_flag(flag)
    }

    /// Payload without the scheme flag
    pub fn payload(&self) -> &[u8] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Split an Ed25519 signature into (signature, public key)
    pub fn ed25519_parts(&self) -> StepSignResult<([u8; 64], [u8; 32])> {
        if self.scheme()? != SignatureScheme::Ed25519 || self.0.len() != Self::ED25519_LEN {
            return Err(StepSignError::parse_error(format!(
                "Not an Ed25519 serialized signature ({} bytes)",
                self.0.len()
            )));
        }
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&self.0[1..65]);
        let mut pk = [0u8; 32];
        pk.copy_from_slice(&self.0[65..97]);
        Ok((sig, pk))
    }

    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> StepSignResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        Ok(Self(STANDARD.decode(s.trim())?))
    }
}

impl fmt::Debug for SerializedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedSignature({})", self.to_base64())
    }
}
