//! Weighted multisig policies and signature combination
//!
//! A policy is an ordered list of `(public key, weight)` members and a
//! threshold. Its address is the sender every co-signed transaction must
//! declare, and [`MultisigPolicy::combine`] turns member signatures into the
//! single envelope the network verifies.

use serde::{Deserialize, Serialize};

use crate::error::{StepSignError, StepSignResult};
use crate::sui::bcs::BcsWriter;
use crate::sui::crypto::blake2b256;
use crate::sui::{PublicKey, SerializedSignature, SignatureScheme, SuiAddress};

/// Largest member set the network accepts
pub const MAX_SIGNERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigMember {
    pub public_key: PublicKey,
    pub weight: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultisigPolicy {
    members: Vec<MultisigMember>,
    threshold: u16,
}

/// One member's signature over a digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    pub public_key: PublicKey,
    pub signature: SerializedSignature,
}

impl PartialSignature {
    pub fn new(public_key: PublicKey, signature: SerializedSignature) -> Self {
        Self { public_key, signature }
    }

    /// Take the public key from a flagged Ed25519 signature
    pub fn from_ed25519(signature: SerializedSignature) -> StepSignResult<Self> {
        let (_, pk) = signature.ed25519_parts()?;
        Ok(Self::new(PublicKey::Ed25519(pk), signature))
    }
}

/// The multisig envelope accepted by submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedSignature {
    signature: SerializedSignature,
    bitmap: u16,
    weight: u16,
}

impl CombinedSignature {
    pub fn as_serialized(&self) -> &SerializedSignature {
        &self.signature
    }

    pub fn into_serialized(self) -> SerializedSignature {
        self.signature
    }

    /// Bit `i` is set when member `i` signed
    pub fn bitmap(&self) -> u16 {
        self.bitmap
    }

    /// Summed weight of the members that signed
    pub fn weight(&self) -> u16 {
        self.weight
    }
}

impl MultisigPolicy {
    pub fn new(members: Vec<MultisigMember>, threshold: u16) -> StepSignResult<Self> {
        if members.is_empty() || members.len() > MAX_SIGNERS {
            return Err(StepSignError::invalid_input(format!(
                "A multisig policy needs 1 to {} members, got {}",
                MAX_SIGNERS,
                members.len()
            )));
        }
        for (i, member) in members.iter().enumerate() {
            if member.weight == 0 {
                return Err(StepSignError::invalid_input(format!("Member {} has zero weight", i)));
            }
            if members[..i].iter().any(|m| m.public_key == member.public_key) {
                return Err(StepSignError::invalid_input(format!(
                    "Member {} repeats public key {}",
                    i, member.public_key
                )));
            }
        }
        let total: u16 = members.iter().map(|m| u16::from(m.weight)).sum();
        if threshold == 0 || threshold > total {
            return Err(StepSignError::invalid_input(format!(
                "Threshold {} must be between 1 and the total weight {}",
                threshold, total
            )));
        }
        Ok(Self { members, threshold })
    }

    /// Shorthand for `(key, weight)` pairs
    pub fn from_pairs(pairs: Vec<(PublicKey, u8)>, threshold: u16) -> StepSignResult<Self> {
        Self::new(
            pairs
                .into_iter()
                .map(|(public_key, weight)| MultisigMember { public_key, weight })
                .collect(),
            threshold,
        )
    }

    pub fn members(&self) -> &[MultisigMember] {
        &self.members
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn total_weight(&self) -> u16 {
        self.members.iter().map(|m| u16::from(m.weight)).sum()
    }

    pub fn index_of(&self, public_key: &PublicKey) -> Option<usize> {
        self.members.iter().position(|m| &m.public_key == public_key)
    }

    /// Weight assigned to `public_key` by this policy
    pub fn weight_of(&self, public_key: &PublicKey) -> Option<u8> {
        self.index_of(public_key).map(|i| self.members[i].weight)
    }

    /// `blake2b256(0x03 || threshold || (flag || pk || weight)*)`
    pub fn address(&self) -> SuiAddress {
        let mut preimage = vec![SignatureScheme::MultiSig.flag()];
        preimage.extend_from_slice(&self.threshold.to_le_bytes());
        for member in &self.members {
            preimage.extend_from_slice(&member.public_key.flagged_bytes());
            preimage.push(member.weight);
        }
        SuiAddress::new(blake2b256(&[&preimage]))
    }

    /// Combine member signatures into one envelope.
    ///
    /// Input order does not matter. Fails with `UnknownSigner`,
    /// `DuplicateSigner` or `ThresholdNotMet`.
    pub fn combine(&self, partials: &[PartialSignature]) -> StepSignResult<CombinedSignature> {
        let mut indexed: Vec<(usize, &PartialSignature)> = Vec::with_capacity(partials.len());
        for partial in partials {
            let index = self.index_of(&partial.public_key).ok_or_else(|| {
                StepSignError::unknown_signer(format!(
                    "{} is not a member of policy {}",
                    partial.public_key,
                    self.address()
                ))
            })?;
            if indexed.iter().any(|(i, _)| *i == index) {
                return Err(StepSignError::duplicate_signer(format!(
                    "Member {} signed more than once",
                    partial.public_key
                )));
            }
            indexed.push((index, partial));
        }

        let weight: u16 = indexed.iter().map(|(i, _)| u16::from(self.members[*i].weight)).sum();
        if weight < self.threshold {
            return Err(StepSignError::threshold_not_met(format!(
                "Collected weight {} of required {}",
                weight, self.threshold
            )));
        }

        indexed.sort_by_key(|(i, _)| *i);

        let mut bitmap: u16 = 0;
        let mut w = BcsWriter::new();
        w.write_u8(SignatureScheme::MultiSig.flag());
        w.write_uleb128(indexed.len() as u32);
        for (index, partial) in &indexed {
            write_compressed(&mut w, partial)?;
            bitmap |= 1 << *index;
        }
        w.write_u16(bitmap);
        self.write_bcs(&mut w);

        crate::log_debug!("multisig", "Combined signatures", signers = indexed.len(), weight = weight, bitmap = bitmap);

        Ok(CombinedSignature {
            signature: SerializedSignature(w.into_bytes()),
            bitmap,
            weight,
        })
    }

    /// BCS `MultiSigPublicKey { pk_map, threshold }`
    fn write_bcs(&self, w: &mut BcsWriter) {
        w.write_seq(&self.members, |w, member| {
            match &member.public_key {
                PublicKey::Ed25519(pk) => {
                    w.write_variant(0).write_fixed(pk);
                }
                PublicKey::ZkLogin(id) => {
                    w.write_variant(3).write_bytes(id);
                }
            }
            w.write_u8(member.weight);
        });
        w.write_u16(self.threshold);
    }
}

/// Scheme payload without the public key
fn write_compressed(w: &mut BcsWriter, partial: &PartialSignature) -> StepSignResult<()> {
    let scheme = partial.signature.scheme()?;
    match (&partial.public_key, scheme) {
        (PublicKey::Ed25519(expected), SignatureScheme::Ed25519) => {
            let (sig, pk) = partial.signature.ed25519_parts()?;
            if &pk != expected {
                return Err(StepSignError::signature_rejected(format!(
                    "Signature carries key {} but was submitted for {}",
                    hex::encode(pk),
                    partial.public_key
                )));
            }
            w.write_variant(0).write_fixed(&sig);
        }
        (PublicKey::ZkLogin(_), SignatureScheme::ZkLogin) => {
            // the whole flagged zkLogin signature, not just its payload
            w.write_variant(3).write_bytes(&partial.signature.0);
        }
        (pk, scheme) => {
            return Err(StepSignError::signature_rejected(format!(
                "{:?} signature cannot stand for {}",
                scheme, pk
            )));
        }
    }
    Ok(())
}
