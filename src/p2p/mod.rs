//! Peer-to-peer gossip protocol: JSON text frames carrying a `{kind,
//! payload}` envelope. The payload is raw JSON, parsed only after dispatch
//! on the kind.
//!
//! Sync converges in at most one request/response round: whenever a session
//! is established the dialing side sends its newest block, and the receiver
//! either pulls the whole chain or pushes its own newest block back.

pub mod peer;

use crate::core::block::Block;
use crate::core::transaction::Tx;
use crate::error::{NodeError, Result};
use crate::node::NodeContext;
use crate::p2p::peer::{Peer, PeerSocket};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    NewestBlock = 0,
    AllBlocksRequest = 1,
    AllBlocksResponse = 2,
    NewBlockNotify = 3,
    NewTxNotify = 4,
    NewPeerNotify = 5,
}

impl TryFrom<u8> for MessageKind {
    type Error = NodeError;

    fn try_from(kind: u8) -> Result<MessageKind> {
        match kind {
            0 => Ok(MessageKind::NewestBlock),
            1 => Ok(MessageKind::AllBlocksRequest),
            2 => Ok(MessageKind::AllBlocksResponse),
            3 => Ok(MessageKind::NewBlockNotify),
            4 => Ok(MessageKind::NewTxNotify),
            5 => Ok(MessageKind::NewPeerNotify),
            other => Err(NodeError::Peer(format!("unknown message kind {other}"))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    kind: u8,
    payload: serde_json::Value,
}

fn make_message<T: Serialize>(kind: MessageKind, payload: &T) -> Result<String> {
    let envelope = Envelope {
        kind: kind as u8,
        payload: serde_json::to_value(payload).map_err(|e| NodeError::Codec(e.to_string()))?,
    };
    serde_json::to_string(&envelope).map_err(|e| NodeError::Codec(e.to_string()))
}

fn parse_payload<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| NodeError::Codec(e.to_string()))
}

///
/// The `handle_message` function dispatches one incoming frame from a peer
/// session. Codec failures are returned to the session loop, which logs
/// them; they do not close the session.
///
pub(crate) async fn handle_message(ctx: &NodeContext, peer: &Arc<Peer>, raw: &str) -> Result<()> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|e| NodeError::Codec(e.to_string()))?;
    match MessageKind::try_from(envelope.kind)? {
        MessageKind::NewestBlock => {
            let payload: Block = parse_payload(envelope.payload)?;
            info!(
                peer = peer.get_key(),
                height = payload.get_height(),
                "received newest block"
            );
            let ours = ctx.chain().newest_block().await?;
            if payload.get_height() >= ours.get_height() {
                // The sender is ahead (or tied): pull their whole chain.
                info!(peer = peer.get_key(), "requesting all blocks");
                peer.send(make_message(MessageKind::AllBlocksRequest, &())?);
            } else {
                // We are ahead: push our newest block so the sender pulls.
                send_newest_block(ctx, peer).await?;
            }
        }
        MessageKind::AllBlocksRequest => {
            let blocks = ctx.all_blocks().await?;
            info!(
                peer = peer.get_key(),
                count = blocks.len(),
                "sending all blocks"
            );
            peer.send(make_message(MessageKind::AllBlocksResponse, &blocks)?);
        }
        MessageKind::AllBlocksResponse => {
            let payload: Vec<Block> = parse_payload(envelope.payload)?;
            info!(
                peer = peer.get_key(),
                count = payload.len(),
                "replacing chain"
            );
            ctx.replace_chain(payload).await?;
        }
        MessageKind::NewBlockNotify => {
            let payload: Block = parse_payload(envelope.payload)?;
            ctx.apply_peer_block(payload).await?;
        }
        MessageKind::NewTxNotify => {
            let payload: Tx = parse_payload(envelope.payload)?;
            ctx.accept_peer_tx(payload).await?;
        }
        MessageKind::NewPeerNotify => {
            let payload: String = parse_payload(envelope.payload)?;
            let (address, port, open_port) = parse_peer_notification(payload.as_str())?;
            add_peer(ctx, address, port, open_port, false).await?;
        }
    }
    Ok(())
}

/// Splits the `"address:port:receiverPort"` payload of a new-peer
/// notification.
fn parse_peer_notification(payload: &str) -> Result<(&str, u16, u16)> {
    let mut parts = payload.split(':');
    let (Some(address), Some(port), Some(open_port), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(NodeError::Peer(format!(
            "malformed peer notification: {payload}"
        )));
    };
    let port = port
        .parse::<u16>()
        .map_err(|e| NodeError::Peer(e.to_string()))?;
    let open_port = open_port
        .parse::<u16>()
        .map_err(|e| NodeError::Peer(e.to_string()))?;
    Ok((address, port, open_port))
}

pub(crate) async fn send_newest_block(ctx: &NodeContext, peer: &Arc<Peer>) -> Result<()> {
    let newest = ctx.chain().newest_block().await?;
    info!(
        peer = peer.get_key(),
        height = newest.get_height(),
        "sending newest block"
    );
    peer.send(make_message(MessageKind::NewestBlock, &newest)?);
    Ok(())
}

///
/// The `add_peer` function dials `ws://address:port/ws?openPort=open_port`,
/// registers the session, and starts the sync handshake by sending our
/// newest block. With `broadcast` set, every existing peer is told how to
/// reach the newcomer first.
///
pub async fn add_peer(
    ctx: &NodeContext,
    address: &str,
    port: u16,
    open_port: u16,
    broadcast: bool,
) -> Result<()> {
    let url = format!("ws://{address}:{port}/ws?openPort={open_port}");
    info!(url = url.as_str(), "dialing peer");
    let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| NodeError::Peer(e.to_string()))?;
    let peer = peer::spawn_session(
        ctx.clone(),
        PeerSocket::Outbound(socket),
        address.to_string(),
        port,
    )?;
    if broadcast {
        broadcast_new_peer(ctx, &peer)?;
    }
    send_newest_block(ctx, &peer).await
}

/// Gossips a freshly mined block to every peer.
pub fn broadcast_new_block(ctx: &NodeContext, block: &Block) -> Result<()> {
    let frame = make_message(MessageKind::NewBlockNotify, block)?;
    for peer in ctx.peers().all()? {
        peer.send(frame.clone());
    }
    Ok(())
}

/// Gossips a freshly accepted local transaction to every peer.
pub fn broadcast_new_tx(ctx: &NodeContext, tx: &Tx) -> Result<()> {
    let frame = make_message(MessageKind::NewTxNotify, tx)?;
    for peer in ctx.peers().all()? {
        peer.send(frame.clone());
    }
    Ok(())
}

fn broadcast_new_peer(ctx: &NodeContext, new_peer: &Arc<Peer>) -> Result<()> {
    for peer in ctx.peers().all()? {
        if peer.get_key() != new_peer.get_key() {
            // The receiver's own listener port rides along: it becomes the
            // openPort the receiver announces when dialing the newcomer.
            let payload = format!("{}:{}", new_peer.get_key(), peer.get_port());
            peer.send(make_message(MessageKind::NewPeerNotify, &payload)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            MessageKind::NewestBlock,
            MessageKind::AllBlocksRequest,
            MessageKind::AllBlocksResponse,
            MessageKind::NewBlockNotify,
            MessageKind::NewTxNotify,
            MessageKind::NewPeerNotify,
        ] {
            assert_eq!(MessageKind::try_from(kind as u8).expect("kind"), kind);
        }
        assert!(MessageKind::try_from(6).is_err());
    }

    #[test]
    fn test_request_message_has_null_payload() {
        let frame = make_message(MessageKind::AllBlocksRequest, &()).expect("make failed");
        let envelope: Envelope = serde_json::from_str(&frame).expect("parse failed");
        assert_eq!(envelope.kind, 1);
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn test_block_payload_round_trip() {
        let coinbase = Tx::new_coinbase("miner-address").expect("coinbase failed");
        let block = Block::mine(String::new(), 1, 1, vec![coinbase]).expect("mine failed");

        let frame = make_message(MessageKind::NewBlockNotify, &block).expect("make failed");
        let envelope: Envelope = serde_json::from_str(&frame).expect("parse failed");
        assert_eq!(envelope.kind, 3);
        let decoded: Block = parse_payload(envelope.payload).expect("payload failed");
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_parse_peer_notification() {
        let (address, port, open_port) =
            parse_peer_notification("127.0.0.1:2000:4000").expect("parse failed");
        assert_eq!(address, "127.0.0.1");
        assert_eq!(port, 2000);
        assert_eq!(open_port, 4000);

        assert!(parse_peer_notification("127.0.0.1:2000").is_err());
        assert!(parse_peer_notification("127.0.0.1:2000:4000:extra").is_err());
        assert!(parse_peer_notification("127.0.0.1:nan:4000").is_err());
    }
}
