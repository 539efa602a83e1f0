//! zkLogin signer
//!
//! The second signature can come from an OpenID identity instead of a held
//! key: an ephemeral Ed25519 key signs the digest and a zero-knowledge proof,
//! fetched once from a proving service, ties that key to the identity for a
//! bounded epoch window.

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, TimeZone, Utc};
use rand::{rngs::OsRng, RngCore};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::CoSigner;
use crate::error::{StepSignError, StepSignResult};
use crate::multisig::PartialSignature;
use crate::rpc::SuiRpc;
use crate::sui::bcs::BcsWriter;
use crate::sui::{PublicKey, SerializedSignature, SignatureScheme, SuiAddress, SuiKeyPair};
use crate::tx::TransactionDigest;
use crate::utils::http::build_client;

/// Epochs an ephemeral key stays valid after the current one
pub const DEFAULT_VALIDITY_EPOCHS: u64 = 2;

/// Claim whose value identifies the user
pub const DEFAULT_KEY_CLAIM: &str = "sub";

// =============================================================================
// Identity assertion
// =============================================================================

/// Claims read from the JWT payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtClaims {
    pub iss: String,
    pub aud: String,
    pub key_claim_name: String,
    pub key_claim_value: String,
    pub exp: Option<DateTime<Utc>>,
}

/// A signed OpenID token plus the user's salt and derived address seed
pub struct IdentityAssertion {
    jwt: SecretString,
    salt: SecretString,
    address_seed: String,
    seed_bytes: [u8; 32],
    claims: JwtClaims,
}

impl IdentityAssertion {
    /// Validate `jwt` against the current time.
    ///
    /// `address_seed` is the decimal field element derived from the key
    /// claim, audience and salt.
    pub fn new(jwt: String, salt: String, address_seed: String, key_claim_name: &str) -> StepSignResult<Self> {
        Self::new_at(jwt, salt, address_seed, key_claim_name, Utc::now())
    }

    pub fn new_at(
        jwt: String,
        salt: String,
        address_seed: String,
        key_claim_name: &str,
        now: DateTime<Utc>,
    ) -> StepSignResult<Self> {
        let claims = parse_claims(&jwt, key_claim_name)?;
        if let Some(exp) = claims.exp {
            if exp <= now {
                return Err(StepSignError::identity_assertion(format!(
                    "Token expired at {}",
                    exp.to_rfc3339()
                )));
            }
        }
        if salt.trim().is_empty() {
            return Err(StepSignError::identity_assertion("Salt is empty"));
        }
        let seed_bytes = decimal_to_be32(&address_seed)
            .map_err(|e| StepSignError::identity_assertion(format!("Invalid address seed: {}", e)))?;

        Ok(Self {
            jwt: SecretString::from(jwt),
            salt: SecretString::from(salt),
            address_seed,
            seed_bytes,
            claims,
        })
    }

    pub fn claims(&self) -> &JwtClaims {
        &self.claims
    }

    pub fn address_seed(&self) -> &str {
        &self.address_seed
    }

    /// `iss_len || iss || address_seed`
    pub fn public_identifier(&self) -> StepSignResult<PublicKey> {
        PublicKey::zklogin(&self.claims.iss, &self.seed_bytes)
            .map_err(|e| StepSignError::identity_assertion(e.message))
    }

    pub fn address(&self) -> StepSignResult<SuiAddress> {
        Ok(self.public_identifier()?.to_address())
    }
}

impl fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityAssertion")
            .field("iss", &self.claims.iss)
            .field("aud", &self.claims.aud)
            .finish_non_exhaustive()
    }
}

fn parse_claims(jwt: &str, key_claim_name: &str) -> StepSignResult<JwtClaims> {
    let parts: Vec<&str> = jwt.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(StepSignError::identity_assertion("Token is not a three-part JWT"));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| StepSignError::identity_assertion(format!("Token payload is not base64url: {}", e)))?;
    let payload: Value = serde_json::from_slice(&payload)
        .map_err(|e| StepSignError::identity_assertion(format!("Token payload is not JSON: {}", e)))?;

    let string_claim = |name: &str| -> StepSignResult<String> {
        payload
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StepSignError::identity_assertion(format!("Token lacks the '{}' claim", name)))
    };

    let aud = match payload.get("aud") {
        Some(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
    .ok_or_else(|| StepSignError::identity_assertion("Token lacks the 'aud' claim"))?;

    let exp = match payload.get("exp").and_then(Value::as_i64) {
        Some(secs) => Some(
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| StepSignError::identity_assertion("Token 'exp' is out of range"))?,
        ),
        None => None,
    };

    Ok(JwtClaims {
        iss: string_claim("iss")?,
        aud,
        key_claim_name: key_claim_name.to_string(),
        key_claim_value: string_claim(key_claim_name)?,
        exp,
    })
}

/// Decimal string to a 32-byte big-endian integer
fn decimal_to_be32(s: &str) -> Result<[u8; 32], String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty".into());
    }
    let mut out = [0u8; 32];
    for c in s.chars() {
        let digit = c.to_digit(10).ok_or_else(|| format!("'{}' is not a decimal digit", c))?;
        let mut carry = digit;
        for byte in out.iter_mut().rev() {
            let v = u32::from(*byte) * 10 + carry;
            *byte = (v & 0xff) as u8;
            carry = v >> 8;
        }
        if carry != 0 {
            return Err("value exceeds 256 bits".into());
        }
    }
    Ok(out)
}

// =============================================================================
// Ephemeral session
// =============================================================================

/// Short-lived key plus the randomness committed in the token nonce
pub struct EphemeralSession {
    keypair: SuiKeyPair,
    randomness: SecretString,
    max_epoch: u64,
}

impl EphemeralSession {
    pub fn new(keypair: SuiKeyPair, randomness: String, max_epoch: u64) -> Self {
        Self {
            keypair,
            randomness: SecretString::from(randomness),
            max_epoch,
        }
    }

    /// Fresh key and randomness valid through `current_epoch + validity_epochs`
    pub fn generate(current_epoch: u64, validity_epochs: u64) -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let randomness = u128::from_be_bytes(bytes).to_string();
        Self::new(
            SuiKeyPair::generate(),
            randomness,
            current_epoch.saturating_add(validity_epochs),
        )
    }

    /// Read the current epoch and generate a session
    pub async fn start(rpc: &dyn SuiRpc, validity_epochs: u64) -> StepSignResult<Self> {
        let epoch = rpc.latest_epoch().await?;
        let session = Self::generate(epoch, validity_epochs);
        crate::log_info!("zklogin", "Ephemeral session started", epoch = epoch, max_epoch = session.max_epoch);
        Ok(session)
    }

    pub fn max_epoch(&self) -> u64 {
        self.max_epoch
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public()
    }

    /// base64 of `flag || public key`, as the prover expects it
    pub fn extended_public_key(&self) -> String {
        STANDARD.encode(self.keypair.public().flagged_bytes())
    }
}

impl fmt::Debug for EphemeralSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralSession")
            .field("public_key", &self.keypair.public())
            .field("max_epoch", &self.max_epoch)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Proof service
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub jwt: String,
    pub extended_ephemeral_public_key: String,
    pub max_epoch: u64,
    pub jwt_randomness: String,
    pub salt: String,
    pub key_claim_name: String,
}

impl fmt::Debug for ProofRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofRequest")
            .field("extended_ephemeral_public_key", &self.extended_ephemeral_public_key)
            .field("max_epoch", &self.max_epoch)
            .field("key_claim_name", &self.key_claim_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPoints {
    pub a: Vec<String>,
    pub b: Vec<Vec<String>>,
    pub c: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssBase64Details {
    pub value: String,
    pub index_mod_4: u8,
}

/// Prover output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    pub proof_points: ProofPoints,
    pub iss_base64_details: IssBase64Details,
    pub header_base64: String,
}

#[async_trait]
pub trait ProofService: Send + Sync {
    async fn prove(&self, request: &ProofRequest) -> StepSignResult<ZkProof>;
}

/// HTTP client for a zkLogin proving service
pub struct ProverClient {
    url: String,
    http: Client,
}

impl ProverClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> StepSignResult<Self> {
        Ok(Self {
            url: url.into(),
            http: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ProofService for ProverClient {
    async fn prove(&self, request: &ProofRequest) -> StepSignResult<ZkProof> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| StepSignError::proof_service("Prover unreachable").with_details(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StepSignError::proof_service("Prover response unreadable").with_details(e.to_string()))?;
        if !status.is_success() {
            return Err(StepSignError::proof_service(format!("Prover returned HTTP {}", status)).with_details(body));
        }

        serde_json::from_str(&body)
            .map_err(|e| StepSignError::proof_service(format!("Malformed prover response: {}", e)).with_details(body))
    }
}

// =============================================================================
// Signer
// =============================================================================

/// Signs as a zkLogin identity; the proof is fetched once per session
pub struct ZkLoginSigner {
    assertion: IdentityAssertion,
    session: EphemeralSession,
    prover: Arc<dyn ProofService>,
    proof: OnceCell<ZkProof>,
    public_key: PublicKey,
}

impl ZkLoginSigner {
    pub fn new(
        assertion: IdentityAssertion,
        session: EphemeralSession,
        prover: Arc<dyn ProofService>,
    ) -> StepSignResult<Self> {
        let public_key = assertion.public_identifier()?;
        Ok(Self {
            assertion,
            session,
            prover,
            proof: OnceCell::new(),
            public_key,
        })
    }

    pub fn max_epoch(&self) -> u64 {
        self.session.max_epoch()
    }

    pub fn address(&self) -> SuiAddress {
        self.public_key.to_address()
    }

    /// Request the proof on first use and reuse it afterwards
    pub async fn proof(&self) -> StepSignResult<&ZkProof> {
        self.proof
            .get_or_try_init(|| async {
                let request = ProofRequest {
                    jwt: self.assertion.jwt.expose_secret().to_string(),
                    extended_ephemeral_public_key: self.session.extended_public_key(),
                    max_epoch: self.session.max_epoch(),
                    jwt_randomness: self.session.randomness.expose_secret().to_string(),
                    salt: self.assertion.salt.expose_secret().to_string(),
                    key_claim_name: self.assertion.claims.key_claim_name.clone(),
                };
                crate::log_info!("zklogin", "Requesting proof", max_epoch = request.max_epoch);
                self.prover.prove(&request).await
            })
            .await
    }
}

#[async_trait]
impl CoSigner for ZkLoginSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key.clone()
    }

    async fn produce_signature(&self, digest: &TransactionDigest) -> StepSignResult<PartialSignature> {
        let proof = self.proof().await?;
        let user_signature = self.session.keypair.sign_with_flag(digest.as_bytes());
        let bytes = serialize_signature(proof, self.assertion.address_seed(), self.max_epoch(), &user_signature);
        crate::log_debug!("zklogin", "zkLogin signature produced", digest = digest, max_epoch = self.max_epoch());
        Ok(PartialSignature::new(self.public_key.clone(), SerializedSignature(bytes)))
    }
}

/// `0x05 || bcs(ZkLoginSignature { inputs, max_epoch, user_signature })`
pub fn serialize_signature(
    proof: &ZkProof,
    address_seed: &str,
    max_epoch: u64,
    user_signature: &SerializedSignature,
) -> Vec<u8> {
    let mut w = BcsWriter::new();
    w.write_u8(SignatureScheme::ZkLogin.flag());

    let points = &proof.proof_points;
    w.write_seq(&points.a, |w, s| {
        w.write_str(s);
    });
    w.write_seq(&points.b, |w, row| {
        w.write_seq(row, |w, s| {
            w.write_str(s);
        });
    });
    w.write_seq(&points.c, |w, s| {
        w.write_str(s);
    });
    w.write_str(&proof.iss_base64_details.value)
        .write_u8(proof.iss_base64_details.index_mod_4)
        .write_str(&proof.header_base64)
        .write_str(address_seed)
        .write_u64(max_epoch)
        .write_bytes(&user_signature.0);

    w.into_bytes()
}
