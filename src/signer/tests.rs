use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use super::zklogin::{ProofPoints, ProofRequest, IssBase64Details, ZkProof};
use super::*;
use crate::error::{ErrorCode, StepSignError};
use crate::sui::{verify_ed25519, SerializedSignature, SignatureScheme, SuiKeyPair};
use crate::tx::TransactionDigest;

fn digest() -> TransactionDigest {
    TransactionDigest::from_bytes(&[9u8; 32]).unwrap()
}

fn peer_key() -> SuiKeyPair {
    SuiKeyPair::from_seed(&[1u8; 32])
}

// =============================================================================
// Scripted peer
// =============================================================================

enum Reply {
    Raw,
    Flagged,
    SignedBy(SuiKeyPair),
    Silent,
    Disconnect,
}

struct ScriptedPeer {
    sink: PeerEventSink,
    key: SuiKeyPair,
    reply: Reply,
    frames: Mutex<Vec<String>>,
}

#[async_trait]
impl PeerLink for ScriptedPeer {
    async fn write_frame(&self, frame: &str) -> StepSignResult<()> {
        self.frames.lock().unwrap().push(frame.to_string());
        let message = STANDARD.decode(frame).unwrap();
        let event = match &self.reply {
            Reply::Raw => PeerEvent::Notification(self.key.sign(&message).to_vec()),
            Reply::Flagged => PeerEvent::Notification(self.key.sign_with_flag(&message).0),
            Reply::SignedBy(other) => PeerEvent::Notification(other.sign_with_flag(&message).0),
            Reply::Disconnect => PeerEvent::Disconnected,
            Reply::Silent => return Ok(()),
        };
        self.sink.deliver(event);
        Ok(())
    }
}

fn remote(reply: Reply, timeout: Duration) -> (RemoteSigner, Arc<ScriptedPeer>) {
    let sink = PeerEventSink::new();
    let peer = Arc::new(ScriptedPeer {
        sink: sink.clone(),
        key: peer_key(),
        reply,
        frames: Mutex::new(Vec::new()),
    });
    let signer = RemoteSigner::new(peer.clone(), sink, peer_key().public_key, timeout);
    (signer, peer)
}

// =============================================================================
// Remote signer
// =============================================================================

#[tokio::test]
async fn test_remote_raw_signature() {
    let (signer, peer) = remote(Reply::Raw, DEFAULT_SIGNING_TIMEOUT);
    let partial = signer.request_signature(&digest()).await.unwrap();

    assert_eq!(partial.public_key, peer_key().public());
    let (sig, pk) = partial.signature.ed25519_parts().unwrap();
    assert_eq!(pk, peer_key().public_key);
    verify_ed25519(&pk, digest().as_bytes(), &sig).unwrap();

    let frames = peer.frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(STANDARD.decode(&frames[0]).unwrap(), digest().as_bytes().to_vec());
    assert_eq!(signer.event_sink().pending(), 0);
}

#[tokio::test]
async fn test_remote_flagged_signature() {
    let (signer, _) = remote(Reply::Flagged, DEFAULT_SIGNING_TIMEOUT);
    let partial = signer.produce_signature(&digest()).await.unwrap();
    assert_eq!(partial.signature.0.len(), SerializedSignature::ED25519_LEN);
}

#[tokio::test]
async fn test_remote_wrong_key_rejected() {
    let other = SuiKeyPair::from_seed(&[2u8; 32]);
    let (signer, _) = remote(Reply::SignedBy(other), DEFAULT_SIGNING_TIMEOUT);
    let err = signer.request_signature(&digest()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SignatureRejected);
    assert_eq!(signer.event_sink().pending(), 0);
}

#[tokio::test]
async fn test_remote_bad_length_rejected() {
    let (signer, _) = remote(Reply::Silent, DEFAULT_SIGNING_TIMEOUT);
    let sink = signer.event_sink();
    let d = digest();
    let request = signer.request_signature(&d);
    let deliver = async {
        while sink.pending() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(sink.deliver(PeerEvent::Notification(vec![0u8; 10])));
    };
    let (result, _) = tokio::join!(request, deliver);
    assert_eq!(result.unwrap_err().code, ErrorCode::SignatureRejected);
}

#[tokio::test(start_paused = true)]
async fn test_remote_timeout_then_late_notification() {
    let (signer, _) = remote(Reply::Silent, Duration::from_secs(30));
    let err = signer.request_signature(&digest()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SigningTimeout);

    let sink = signer.event_sink();
    assert_eq!(sink.pending(), 0);
    let late = peer_key().sign(digest().as_bytes()).to_vec();
    assert!(!sink.deliver(PeerEvent::Notification(late)));
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_does_not_fail_next_request() {
    let (signer, _) = remote(Reply::Silent, Duration::from_secs(30));
    let first = digest();
    let err = signer.request_signature(&first).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SigningTimeout);

    let second = TransactionDigest::from_bytes(&[4u8; 32]).unwrap();
    let sink = signer.event_sink();
    let request = signer.request_signature(&second);
    let deliver = async {
        while sink.pending() == 0 {
            tokio::task::yield_now().await;
        }
        // answer to the timed-out request arrives first
        assert!(!sink.deliver(PeerEvent::Notification(peer_key().sign(first.as_bytes()).to_vec())));
        assert_eq!(sink.pending(), 1);
        assert!(sink.deliver(PeerEvent::Notification(peer_key().sign(second.as_bytes()).to_vec())));
    };
    let (result, _) = tokio::join!(request, deliver);

    let partial = result.unwrap();
    let (sig, _) = partial.signature.ed25519_parts().unwrap();
    verify_ed25519(&peer_key().public_key, second.as_bytes(), &sig).unwrap();
    assert_eq!(sink.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_disconnect_preempts_timeout() {
    let (signer, _) = remote(Reply::Disconnect, Duration::from_secs(30));
    let started = tokio::time::Instant::now();
    let err = signer.request_signature(&digest()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransportError);
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_remote_second_request_is_busy() {
    let (signer, _) = remote(Reply::Silent, Duration::from_secs(30));
    let signer = Arc::new(signer);

    let first = tokio::spawn({
        let signer = signer.clone();
        async move { signer.request_signature(&digest()).await }
    });
    while signer.event_sink().pending() == 0 {
        tokio::task::yield_now().await;
    }

    let err = signer.request_signature(&digest()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SessionBusy);

    assert_eq!(signer.cancel_pending(), 1);
    let first = first.await.unwrap().unwrap_err();
    assert_eq!(first.code, ErrorCode::TransportError);
    assert_eq!(signer.cancel_pending(), 0);
}

#[tokio::test]
async fn test_dropped_request_clears_session() {
    let (signer, _) = remote(Reply::Silent, Duration::from_secs(30));
    let outcome = tokio::time::timeout(Duration::from_millis(20), signer.request_signature(&digest())).await;
    assert!(outcome.is_err());
    assert_eq!(signer.event_sink().pending(), 0);
}

#[test]
fn test_stray_event_is_dropped() {
    let sink = PeerEventSink::new();
    assert!(!sink.deliver(PeerEvent::Notification(vec![1, 2, 3])));
    assert!(!sink.deliver(PeerEvent::Disconnected));
}

// =============================================================================
// TCP link
// =============================================================================

/// Accept one connection, answer one frame with `key`, then hang up
async fn serve_once(listener: TcpListener, key: Option<SuiKeyPair>) {
    let (stream, _) = listener.accept().await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let frame = lines.next_line().await.unwrap().unwrap();
    if let Some(key) = key {
        let message = STANDARD.decode(frame.trim()).unwrap();
        let reply = format!("{}\n", STANDARD.encode(key.sign(&message)));
        write.write_all(reply.as_bytes()).await.unwrap();
        write.flush().await.unwrap();
    }
}

#[tokio::test]
async fn test_tcp_link_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = tokio::spawn(serve_once(listener, Some(peer_key())));

    let sink = PeerEventSink::new();
    let link = TcpPeerLink::connect(&addr, sink.clone()).await.unwrap();
    let signer = RemoteSigner::new(Arc::new(link), sink, peer_key().public_key, Duration::from_secs(5));

    let partial = signer.request_signature(&digest()).await.unwrap();
    assert_eq!(partial.public_key, peer_key().public());
    server.await.unwrap();
}

#[tokio::test]
async fn test_tcp_link_hangup_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = tokio::spawn(serve_once(listener, None));

    let sink = PeerEventSink::new();
    let link = TcpPeerLink::connect(&addr, sink.clone()).await.unwrap();
    let signer = RemoteSigner::new(Arc::new(link), sink, peer_key().public_key, Duration::from_secs(5));

    let err = signer.request_signature(&digest()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransportError);
    server.await.unwrap();
}

#[tokio::test]
async fn test_tcp_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = TcpPeerLink::connect(&addr, PeerEventSink::new()).await.err().unwrap();
    assert_eq!(err.code, ErrorCode::TransportError);
}

// =============================================================================
// Local signer
// =============================================================================

#[tokio::test]
async fn test_local_signer() {
    let pair = SuiKeyPair::from_seed(&[3u8; 32]);
    let signer = LocalKeySigner::from_encoded(&pair.to_bech32().unwrap()).unwrap();
    assert_eq!(signer.public_key(), pair.public());

    let partial = signer.produce_signature(&digest()).await.unwrap();
    let (sig, pk) = partial.signature.ed25519_parts().unwrap();
    verify_ed25519(&pk, digest().as_bytes(), &sig).unwrap();
}

#[test]
fn test_local_signer_bad_key() {
    let err = LocalKeySigner::from_encoded("not-a-key").err().unwrap();
    assert_eq!(err.code, ErrorCode::KeySignError);
}

// =============================================================================
// zkLogin signer
// =============================================================================

struct MockProver {
    calls: AtomicUsize,
    fail: bool,
    last_max_epoch: Mutex<Option<u64>>,
}

impl MockProver {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
            last_max_epoch: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ProofService for MockProver {
    async fn prove(&self, request: &ProofRequest) -> StepSignResult<ZkProof> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_max_epoch.lock().unwrap() = Some(request.max_epoch);
        if self.fail {
            return Err(StepSignError::proof_service("Prover returned HTTP 500").with_details("boom"));
        }
        Ok(ZkProof {
            proof_points: ProofPoints {
                a: vec!["1".into(), "2".into(), "1".into()],
                b: vec![vec!["3".into(), "4".into()], vec!["5".into(), "6".into()], vec!["1".into(), "0".into()]],
                c: vec!["7".into(), "8".into(), "1".into()],
            },
            iss_base64_details: IssBase64Details {
                value: "yJpc3MiOiJodHRwczovL2FjY291bnRzLmdvb2dsZS5jb20iLC".into(),
                index_mod_4: 1,
            },
            header_base64: "eyJhbGciOiJSUzI1NiJ9".into(),
        })
    }
}

fn assertion() -> IdentityAssertion {
    let payload = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": ["stepsign-client"],
        "sub": "110463452167303598383",
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    let jwt = format!(
        "{}.{}.c2ln",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );
    IdentityAssertion::new(jwt, "129390038577185583942388216820280642146".into(), "1234567890".into(), "sub")
        .unwrap()
}

fn session_key() -> SuiKeyPair {
    SuiKeyPair::from_seed(&[5u8; 32])
}

#[tokio::test]
async fn test_zklogin_signature_layout() {
    let prover = MockProver::new(false);
    let session = EphemeralSession::new(session_key(), "42".into(), 12);
    let signer = ZkLoginSigner::new(assertion(), session, prover.clone()).unwrap();

    assert_eq!(signer.public_key().scheme(), SignatureScheme::ZkLogin);
    assert_eq!(signer.max_epoch(), 12);

    let partial = signer.produce_signature(&digest()).await.unwrap();
    let bytes = &partial.signature.0;
    assert_eq!(bytes[0], SignatureScheme::ZkLogin.flag());

    // user signature is the trailing length-prefixed field
    let user_sig = &bytes[bytes.len() - SerializedSignature::ED25519_LEN..];
    assert_eq!(bytes[bytes.len() - SerializedSignature::ED25519_LEN - 1], 97);
    let (sig, pk) = SerializedSignature(user_sig.to_vec()).ed25519_parts().unwrap();
    assert_eq!(pk, session_key().public_key);
    verify_ed25519(&pk, digest().as_bytes(), &sig).unwrap();

    // max_epoch precedes it
    let epoch_at = bytes.len() - SerializedSignature::ED25519_LEN - 1 - 8;
    assert_eq!(&bytes[epoch_at..epoch_at + 8], &12u64.to_le_bytes());

    assert_eq!(*prover.last_max_epoch.lock().unwrap(), Some(12));
}

#[tokio::test]
async fn test_zklogin_proof_is_cached() {
    let prover = MockProver::new(false);
    let session = EphemeralSession::new(session_key(), "42".into(), 12);
    let signer = ZkLoginSigner::new(assertion(), session, prover.clone()).unwrap();

    signer.produce_signature(&digest()).await.unwrap();
    signer.produce_signature(&digest()).await.unwrap();
    assert_eq!(prover.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zklogin_prover_failure() {
    let prover = MockProver::new(true);
    let session = EphemeralSession::new(session_key(), "42".into(), 12);
    let signer = ZkLoginSigner::new(assertion(), session, prover.clone()).unwrap();

    let err = signer.produce_signature(&digest()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ProofServiceError);
    assert_eq!(err.details.as_deref(), Some("boom"));

    // failures are not cached
    assert!(signer.produce_signature(&digest()).await.is_err());
    assert_eq!(prover.calls.load(Ordering::SeqCst), 2);
}
