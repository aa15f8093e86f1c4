//! Peer sessions and the process-wide peer registry.
//!
//! A peer is keyed `"address:port"` where `port` is the peer's open-listener
//! port, not the ephemeral socket port. Each session owns a framed text
//! channel (inbound via the axum `/ws` upgrade, outbound via a tungstenite
//! dial) and an unbounded outbox; a single task drives both directions and
//! tears the peer down when either side fails.

use crate::error::{NodeError, Result};
use crate::node::NodeContext;
use axum::extract::ws;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

pub struct Peer {
    key: String,
    address: String,
    port: u16,
    outbox: mpsc::UnboundedSender<String>,
}

impl Peer {
    pub fn get_key(&self) -> &str {
        self.key.as_str()
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Queues a frame on the session's outbox. A dead session drops the
    /// frame; the registry entry is about to disappear anyway.
    pub fn send(&self, frame: String) {
        let _ = self.outbox.send(frame);
    }
}

/// Process-wide peer table, `key → peer` under a lock.
pub struct PeerRegistry {
    inner: RwLock<HashMap<String, Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, peer: Arc<Peer>) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        inner.insert(peer.get_key().to_string(), peer);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        inner.remove(key);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.contains_key(key))
    }

    pub fn all(&self) -> Result<Vec<Arc<Peer>>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.values().cloned().collect())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One framed text socket, whichever side established it.
pub enum PeerSocket {
    Inbound(ws::WebSocket),
    Outbound(WebSocketStream<MaybeTlsStream<TcpStream>>),
}

/// Ping cadence; a broken connection surfaces as a write error at the next
/// beat and evicts the peer.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

impl PeerSocket {
    async fn send_ping(&mut self) -> Result<()> {
        match self {
            PeerSocket::Inbound(socket) => socket
                .send(ws::Message::Ping(Vec::new().into()))
                .await
                .map_err(|e| NodeError::Peer(e.to_string())),
            PeerSocket::Outbound(socket) => socket
                .send(tungstenite::Message::Ping(Vec::new().into()))
                .await
                .map_err(|e| NodeError::Peer(e.to_string())),
        }
    }

    async fn send_text(&mut self, frame: String) -> Result<()> {
        match self {
            PeerSocket::Inbound(socket) => socket
                .send(ws::Message::Text(frame.into()))
                .await
                .map_err(|e| NodeError::Peer(e.to_string())),
            PeerSocket::Outbound(socket) => socket
                .send(tungstenite::Message::Text(frame.into()))
                .await
                .map_err(|e| NodeError::Peer(e.to_string())),
        }
    }

    /// Next text frame; None once the connection is closed or failed.
    async fn next_text(&mut self) -> Option<String> {
        loop {
            let frame = match self {
                PeerSocket::Inbound(socket) => match socket.recv().await? {
                    Ok(ws::Message::Text(text)) => Some(text.as_str().to_string()),
                    Ok(ws::Message::Close(_)) | Err(_) => return None,
                    Ok(_) => None,
                },
                PeerSocket::Outbound(socket) => match socket.next().await? {
                    Ok(tungstenite::Message::Text(text)) => Some(text.as_str().to_string()),
                    Ok(tungstenite::Message::Close(_)) | Err(_) => return None,
                    Ok(_) => None,
                },
            };
            if let Some(frame) = frame {
                return Some(frame);
            }
        }
    }
}

///
/// The `spawn_session` function registers a peer and starts its session
/// task. The task drives both directions of the socket: outbox frames are
/// written out, incoming frames are dispatched to the protocol handler in
/// arrival order. When the socket closes or errors on either side, the peer
/// is removed from the registry and the outbox is dropped.
///
pub(crate) fn spawn_session(
    ctx: NodeContext,
    mut socket: PeerSocket,
    address: String,
    port: u16,
) -> Result<Arc<Peer>> {
    let key = format!("{address}:{port}");
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();
    let peer = Arc::new(Peer {
        key: key.clone(),
        address,
        port,
        outbox,
    });
    ctx.peers().insert(peer.clone())?;
    info!(peer = key.as_str(), "peer session established");

    let session_peer = peer.clone();
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if socket.send_ping().await.is_err() {
                        break;
                    }
                }
                outgoing = outbox_rx.recv() => match outgoing {
                    Some(frame) => {
                        if socket.send_text(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = socket.next_text() => match incoming {
                    Some(frame) => {
                        if let Err(err) =
                            crate::p2p::handle_message(&ctx, &session_peer, frame.as_str()).await
                        {
                            warn!(
                                peer = session_peer.get_key(),
                                error = %err,
                                "failed to handle peer frame"
                            );
                            // An undecodable frame means the stream is
                            // unusable; a rejected block or transaction is
                            // not.
                            if matches!(err, NodeError::Codec(_)) {
                                break;
                            }
                        }
                    }
                    None => break,
                },
            }
        }
        if let Err(err) = ctx.peers().remove(session_peer.get_key()) {
            warn!(error = %err, "failed to remove peer from registry");
        }
        info!(peer = session_peer.get_key(), "peer session closed");
    });
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_peer(key: &str, address: &str, port: u16) -> (Arc<Peer>, mpsc::UnboundedReceiver<String>) {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Peer {
                key: key.to_string(),
                address: address.to_string(),
                port,
                outbox,
            }),
            outbox_rx,
        )
    }

    #[test]
    fn test_registry_insert_and_remove() {
        let registry = PeerRegistry::new();
        let (peer, _rx) = test_peer("127.0.0.1:4000", "127.0.0.1", 4000);

        registry.insert(peer).expect("insert failed");
        assert!(registry.contains("127.0.0.1:4000").expect("contains failed"));
        assert_eq!(registry.keys().expect("keys failed"), vec!["127.0.0.1:4000"]);

        registry.remove("127.0.0.1:4000").expect("remove failed");
        assert!(registry.is_empty().expect("is_empty failed"));
    }

    #[test]
    fn test_peer_send_queues_frame() {
        let (peer, mut rx) = test_peer("127.0.0.1:4000", "127.0.0.1", 4000);
        peer.send("frame".to_string());
        assert_eq!(rx.try_recv().expect("recv failed"), "frame");
    }

    #[test]
    fn test_peer_send_after_session_death_is_silent() {
        let (peer, rx) = test_peer("127.0.0.1:4000", "127.0.0.1", 4000);
        drop(rx);
        peer.send("frame".to_string()); // must not panic
    }
}
