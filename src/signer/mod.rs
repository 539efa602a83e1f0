//! Signer adapters
//!
//! Every co-signer turns a [`TransactionDigest`] into a [`PartialSignature`]:
//! - [`LocalKeySigner`]: an Ed25519 key held by the app
//! - [`ZkLoginSigner`]: an ephemeral key backed by a zero-knowledge proof
//! - [`RemoteSigner`]: the hardware peer reached over a [`PeerLink`]

mod link;
mod local;
mod remote;
pub mod zklogin;

#[cfg(test)]
mod tests;

pub use link::{PeerLink, TcpPeerLink};
pub use local::LocalKeySigner;
pub use remote::{PeerEvent, PeerEventSink, RemoteSigner, SessionId, DEFAULT_SIGNING_TIMEOUT};
pub use zklogin::{EphemeralSession, IdentityAssertion, ProofService, ProverClient, ZkLoginSigner};

use async_trait::async_trait;

use crate::error::StepSignResult;
use crate::multisig::PartialSignature;
use crate::sui::PublicKey;
use crate::tx::TransactionDigest;

#[async_trait]
pub trait CoSigner: Send + Sync {
    /// Key this signer signs for, as listed in the multisig policy
    fn public_key(&self) -> PublicKey;

    async fn produce_signature(&self, digest: &TransactionDigest) -> StepSignResult<PartialSignature>;
}
