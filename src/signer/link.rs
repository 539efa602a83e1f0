//! Peer transport
//!
//! The peer speaks base64 text frames: the request frame carries the digest
//! and each notification frame carries a signature. [`TcpPeerLink`] reaches
//! a BLE bridge (or a simulator) with one frame per line.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::remote::{PeerEvent, PeerEventSink};
use crate::error::{StepSignError, StepSignResult};

/// A previously established link to exactly one peer
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Write one request frame
    async fn write_frame(&self, frame: &str) -> StepSignResult<()>;
}

/// Newline-delimited frames over TCP
pub struct TcpPeerLink {
    writer: Mutex<OwnedWriteHalf>,
    reader: JoinHandle<()>,
}

impl TcpPeerLink {
    /// Connect and start forwarding incoming frames to `sink`
    pub async fn connect(addr: &str, sink: PeerEventSink) -> StepSignResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StepSignError::transport(format!("Cannot reach peer at {}", addr)).with_details(e.to_string()))?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        let reader = tokio::spawn(forward_frames(BufReader::new(read), sink));
        crate::log_info!("peer_link", "Connected to peer", peer = addr);

        Ok(Self {
            writer: Mutex::new(write),
            reader,
        })
    }
}

impl Drop for TcpPeerLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PeerLink for TcpPeerLink {
    async fn write_frame(&self, frame: &str) -> StepSignResult<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{}\n", frame).as_bytes())
            .await
            .map_err(|e| StepSignError::transport("Peer write failed").with_details(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| StepSignError::transport("Peer write failed").with_details(e.to_string()))
    }
}

/// Read frames until EOF, turning each into a [`PeerEvent`]
pub(crate) async fn forward_frames<R: AsyncBufRead + Unpin>(reader: R, sink: PeerEventSink) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event = match STANDARD.decode(line) {
                    Ok(bytes) => PeerEvent::Notification(bytes),
                    Err(e) => PeerEvent::Error(format!("Malformed frame: {}", e)),
                };
                sink.deliver(event);
            }
            Ok(None) => {
                crate::log_info!("peer_link", "Peer closed the link");
                sink.deliver(PeerEvent::Disconnected);
                break;
            }
            Err(e) => {
                sink.deliver(PeerEvent::Error(e.to_string()));
                break;
            }
        }
    }
}
