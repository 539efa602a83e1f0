use async_trait::async_trait;

use super::CoSigner;
use crate::error::StepSignResult;
use crate::multisig::PartialSignature;
use crate::sui::{PublicKey, SuiKeyPair};
use crate::tx::TransactionDigest;

/// Signs with an Ed25519 key held in process
pub struct LocalKeySigner {
    keypair: SuiKeyPair,
}

impl LocalKeySigner {
    pub fn new(keypair: SuiKeyPair) -> Self {
        Self { keypair }
    }

    /// Hex seed or `suiprivkey1…`; malformed input is a `KeySignError`
    pub fn from_encoded(key: &str) -> StepSignResult<Self> {
        Ok(Self::new(SuiKeyPair::parse(key)?))
    }
}

#[async_trait]
impl CoSigner for LocalKeySigner {
    fn public_key(&self) -> PublicKey {
        self.keypair.public()
    }

    async fn produce_signature(&self, digest: &TransactionDigest) -> StepSignResult<PartialSignature> {
        let signature = self.keypair.sign_with_flag(digest.as_bytes());
        crate::log_debug!("signer", "Local signature produced", digest = digest, address = self.keypair.address);
        Ok(PartialSignature::new(self.public_key(), signature))
    }
}
