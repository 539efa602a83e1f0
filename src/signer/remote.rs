//! Remote (hardware peer) signer
//!
//! One request is one frame written to the peer; one notification read back
//! resolves it. Pending requests live in a session table keyed by
//! [`SessionId`]; every terminal outcome (signature, transport failure,
//! timeout, cancellation) removes the entry, so a notification arriving
//! afterwards finds nothing to resolve and is dropped.
//!
//! Frames carry no correlation id. A late answer to an earlier request can
//! reach the next session, so a well-formed signature that does not verify
//! over the pending digest is dropped and the session keeps waiting.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

use super::link::PeerLink;
use super::CoSigner;
use crate::error::{StepSignError, StepSignResult};
use crate::multisig::PartialSignature;
use crate::sui::{verify_ed25519, PublicKey, SerializedSignature};
use crate::tx::TransactionDigest;

/// Observed peer response time bound
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Something the link observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Decoded notification payload
    Notification(Vec<u8>),
    Disconnected,
    Error(String),
}

#[derive(Default)]
struct SessionTable {
    next_id: u64,
    pending: HashMap<SessionId, PendingSession>,
}

struct PendingSession {
    reply: oneshot::Sender<PeerEvent>,
    peer_key: [u8; 32],
    digest: [u8; 32],
}

impl PendingSession {
    /// A signature from the right key over some other message
    fn is_stale(&self, bytes: &[u8]) -> bool {
        match split_frame(&self.peer_key, bytes) {
            Ok(raw) => verify_ed25519(&self.peer_key, &self.digest, &raw).is_err(),
            Err(_) => false,
        }
    }
}

/// Entry point for link events; cheap to clone into reader tasks
#[derive(Clone, Default)]
pub struct PeerEventSink {
    table: Arc<Mutex<SessionTable>>,
}

impl PeerEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionTable> {
        // The table holds no invariants a panicking holder could break
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route an event to the pending session.
    ///
    /// Returns false when no session was waiting (stray or late event) or
    /// when a notification answers a different digest.
    pub fn deliver(&self, event: PeerEvent) -> bool {
        let sender = {
            let mut table = self.lock();
            let oldest = table.pending.keys().min().copied();
            if let (Some(id), PeerEvent::Notification(bytes)) = (oldest, &event) {
                if table.pending.get(&id).map(|s| s.is_stale(bytes)).unwrap_or(false) {
                    crate::log_warn!("remote_signer", "Dropping signature over another digest", session = id);
                    return false;
                }
            }
            oldest.and_then(|id| table.pending.remove(&id).map(|s| (id, s.reply)))
        };

        match sender {
            Some((id, tx)) => {
                if tx.send(event).is_err() {
                    crate::log_debug!("remote_signer", "Session ended before delivery", session = id);
                    return false;
                }
                true
            }
            None => {
                match event {
                    PeerEvent::Notification(bytes) => {
                        crate::log_warn!("remote_signer", "Dropping notification with no pending session", bytes = bytes.len())
                    }
                    other => crate::log_debug!("remote_signer", "Link event with no pending session", event = format!("{:?}", other)),
                }
                false
            }
        }
    }

    /// Number of sessions awaiting a notification
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn open(&self, session: PendingSession) -> StepSignResult<SessionId> {
        let mut table = self.lock();
        if let Some(existing) = table.pending.keys().next() {
            return Err(StepSignError::session_busy("A signature request is already pending on this peer")
                .with_details(existing.to_string()));
        }
        table.next_id += 1;
        let id = SessionId(table.next_id);
        table.pending.insert(id, session);
        Ok(id)
    }

    fn close(&self, id: SessionId) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    fn clear(&self) -> usize {
        let mut table = self.lock();
        let n = table.pending.len();
        table.pending.clear();
        n
    }
}

/// Removes the session however the request future ends
struct SessionGuard<'a> {
    sink: &'a PeerEventSink,
    id: SessionId,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.sink.close(self.id) {
            crate::log_debug!("remote_signer", "Session cleared", session = self.id);
        }
    }
}

/// Requests signatures from one hardware peer
pub struct RemoteSigner {
    link: Arc<dyn PeerLink>,
    sink: PeerEventSink,
    peer_key: [u8; 32],
    timeout: Duration,
}

impl RemoteSigner {
    /// `sink` must be the one the link delivers its events to
    pub fn new(link: Arc<dyn PeerLink>, sink: PeerEventSink, peer_key: [u8; 32], timeout: Duration) -> Self {
        Self {
            link,
            sink,
            peer_key,
            timeout,
        }
    }

    pub fn peer_public_key(&self) -> PublicKey {
        PublicKey::Ed25519(self.peer_key)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn event_sink(&self) -> PeerEventSink {
        self.sink.clone()
    }

    /// Cancel whatever is pending; the waiting call fails with `TransportError`
    pub fn cancel_pending(&self) -> usize {
        let n = self.sink.clear();
        if n > 0 {
            crate::log_info!("remote_signer", "Cancelled pending session", count = n);
        }
        n
    }

    /// Send `digest` to the peer and wait for its signature
    pub async fn request_signature(&self, digest: &TransactionDigest) -> StepSignResult<PartialSignature> {
        let (tx, rx) = oneshot::channel();
        let id = self.sink.open(PendingSession {
            reply: tx,
            peer_key: self.peer_key,
            digest: *digest.as_bytes(),
        })?;
        let _guard = SessionGuard { sink: &self.sink, id };
        crate::log_info!("remote_signer", "Requesting peer signature", session = id, digest = digest);

        self.link
            .write_frame(&STANDARD.encode(digest.as_bytes()))
            .await
            .map_err(|e| StepSignError::transport("Failed to send digest to peer").with_details(e.to_string()))?;

        let event = match tokio::time::timeout(self.timeout, rx).await {
            Err(_) => {
                crate::log_warn!("remote_signer", "Peer did not answer in time", session = id, timeout_secs = self.timeout.as_secs());
                return Err(StepSignError::signing_timeout(format!(
                    "No signature from peer within {}s",
                    self.timeout.as_secs()
                ))
                .with_details(id.to_string()));
            }
            Ok(Err(_)) => {
                return Err(StepSignError::transport("Signature request was cancelled").with_details(id.to_string()))
            }
            Ok(Ok(event)) => event,
        };

        match event {
            PeerEvent::Notification(bytes) => {
                let partial = self.accept(digest, &bytes)?;
                crate::log_info!("remote_signer", "Peer signature received", session = id);
                Ok(partial)
            }
            PeerEvent::Disconnected => {
                crate::log_warn!("remote_signer", "Peer disconnected during request", session = id);
                Err(StepSignError::transport("Peer disconnected").with_details(id.to_string()))
            }
            PeerEvent::Error(message) => {
                crate::log_warn!("remote_signer", "Peer link error during request", session = id, error = message);
                Err(StepSignError::transport(format!("Peer link error: {}", message)).with_details(id.to_string()))
            }
        }
    }

    /// Accept a raw 64-byte signature or a flagged 97-byte one
    fn accept(&self, digest: &TransactionDigest, bytes: &[u8]) -> StepSignResult<PartialSignature> {
        let raw = split_frame(&self.peer_key, bytes)?;

        verify_ed25519(&self.peer_key, digest.as_bytes(), &raw).map_err(|e| {
            StepSignError::signature_rejected("Peer signature does not verify over the digest")
                .with_details(e.message)
        })?;

        Ok(PartialSignature::new(
            self.peer_public_key(),
            SerializedSignature::ed25519(&raw, &self.peer_key),
        ))
    }
}

/// Raw signature out of a 64-byte or flagged 97-byte notification
fn split_frame(peer_key: &[u8; 32], bytes: &[u8]) -> StepSignResult<[u8; 64]> {
    match bytes.len() {
        64 => {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(bytes);
            Ok(sig)
        }
        SerializedSignature::ED25519_LEN => {
            let (sig, pk) = SerializedSignature(bytes.to_vec())
                .ed25519_parts()
                .map_err(|e| StepSignError::signature_rejected(e.message))?;
            if &pk != peer_key {
                return Err(StepSignError::signature_rejected(format!(
                    "Peer signed with {} instead of the configured key",
                    hex::encode(pk)
                )));
            }
            Ok(sig)
        }
        n => Err(StepSignError::signature_rejected(format!(
            "Unexpected peer signature length {}",
            n
        ))),
    }
}

#[async_trait]
impl CoSigner for RemoteSigner {
    fn public_key(&self) -> PublicKey {
        self.peer_public_key()
    }

    async fn produce_signature(&self, digest: &TransactionDigest) -> StepSignResult<PartialSignature> {
        self.request_signature(digest).await
    }
}
