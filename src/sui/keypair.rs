//! Ed25519 key pairs
//!
//! Keys come from raw seeds, hex, or the `suiprivkey1…` Bech32 export
//! format. Malformed key material is reported as `KeySignError`.

use bech32::{FromBase32, ToBase32, Variant};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{StepSignError, StepSignResult};
use crate::sui::address::SuiAddress;
use crate::sui::crypto::{PublicKey, SerializedSignature, SignatureScheme};

/// Human-readable part of exported private keys
pub const SUI_PRIVATE_KEY_PREFIX: &str = "suiprivkey";

/// Sui key pair
#[derive(Clone)]
pub struct SuiKeyPair {
    signing_key: SigningKey,
    pub public_key: [u8; 32],
    pub address: SuiAddress,
}

impl SuiKeyPair {
    /// Create from seed bytes (32 bytes)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key: VerifyingKey = (&signing_key).into();
        let public_key = verifying_key.to_bytes();
        let address = PublicKey::Ed25519(public_key).to_address();

        Self {
            signing_key,
            public_key,
            address,
        }
    }

    /// Fresh random key pair (ephemeral keys, tests)
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let pair = Self::from_seed(&seed);
        seed.zeroize();
        pair
    }

    /// Parse a 64-char hex seed (0x prefix optional)
    pub fn from_hex(s: &str) -> StepSignResult<Self> {
        let mut bytes = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| StepSignError::key_sign(format!("Invalid hex key: {}", e)))?;
        let result = Self::from_slice(&bytes);
        bytes.zeroize();
        result
    }

    /// Parse `suiprivkey1…` (flag byte followed by the 32-byte seed)
    pub fn from_bech32(s: &str) -> StepSignResult<Self> {
        let (hrp, data, variant) = bech32::decode(s.trim())
            .map_err(|e| StepSignError::key_sign(format!("Invalid bech32 key: {}", e)))?;
        if hrp != SUI_PRIVATE_KEY_PREFIX || variant != Variant::Bech32 {
            return Err(StepSignError::key_sign(format!(
                "Expected '{}' bech32 key, got '{}'",
                SUI_PRIVATE_KEY_PREFIX, hrp
            )));
        }
        let mut bytes = Vec::<u8>::from_base32(&data)
            .map_err(|e| StepSignError::key_sign(format!("Invalid key payload: {}", e)))?;

        let result = match bytes.split_first() {
            Some((&flag, seed)) if flag == SignatureScheme::Ed25519.flag() => Self::from_slice(seed),
            Some((&flag, _)) => Err(StepSignError::key_sign(format!(
                "Unsupported key scheme flag {:#04x}",
                flag
            ))),
            None => Err(StepSignError::key_sign("Empty key payload")),
        };
        bytes.zeroize();
        result
    }

    /// Accept either export format
    pub fn parse(s: &str) -> StepSignResult<Self> {
        if s.trim().starts_with(SUI_PRIVATE_KEY_PREFIX) {
            Self::from_bech32(s)
        } else {
            Self::from_hex(s)
        }
    }

    fn from_slice(bytes: &[u8]) -> StepSignResult<Self> {
        let mut seed: [u8; 32] = bytes.try_into().map_err(|_| {
            StepSignError::key_sign(format!("Private key must be 32 bytes, got {}", bytes.len()))
        })?;
        let pair = Self::from_seed(&seed);
        seed.zeroize();
        Ok(pair)
    }

    /// Export as `suiprivkey1…`
    pub fn to_bech32(&self) -> StepSignResult<String> {
        let mut payload = Vec::with_capacity(33);
        payload.push(SignatureScheme::Ed25519.flag());
        payload.extend_from_slice(&self.signing_key.to_bytes());
        let encoded = bech32::encode(SUI_PRIVATE_KEY_PREFIX, payload.to_base32(), Variant::Bech32)
            .map_err(|e| StepSignError::key_sign(format!("Bech32 encoding failed: {}", e)));
        payload.zeroize();
        encoded
    }

    pub fn public(&self) -> PublicKey {
        PublicKey::Ed25519(self.public_key)
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_bytes()
    }

    /// Create a signature with scheme flag and public key
    pub fn sign_with_flag(&self, message: &[u8]) -> SerializedSignature {
        SerializedSignature::ed25519(&self.sign(message), &self.public_key)
    }
}

impl std::fmt::Debug for SuiKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiKeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Verify a raw Ed25519 signature
pub fn verify_ed25519(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> StepSignResult<()> {
    let key = VerifyingKey::from_bytes(public_key)?;
    let sig = Signature::from_bytes(signature);
    key.verify(message, &sig)?;
    Ok(())
}
