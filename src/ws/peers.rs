use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error};

use super::connctx::{ChannelKind, ConnectionId};
use crate::models::ServerMessage;

struct Peer {
    kind: ChannelKind,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

/// Outbound side of every live connection. Services address peers by connection id
/// and never touch sockets directly.
#[derive(Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<ConnectionId, Peer>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, id: ConnectionId, kind: ChannelKind, outbox: mpsc::UnboundedSender<ServerMessage>) {
        self.peers.write().await.insert(id, Peer { kind, outbox });
    }

    pub async fn detach(&self, id: ConnectionId) -> bool {
        self.peers.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn count_by_kind(&self, kind: ChannelKind) -> usize {
        self.peers.read().await.values().filter(|p| p.kind == kind).count()
    }

    pub async fn send_to(&self, id: ConnectionId, msg: ServerMessage) {
        let peers = self.peers.read().await;
        match peers.get(&id) {
            Some(peer) => deliver(id, peer, msg),
            None => debug!("Dropping message for detached connection {}", id),
        }
    }

    /// Sends a copy of `msg` to each listed connection that is still attached.
    pub async fn send_to_many<'a, I>(&self, ids: I, msg: &ServerMessage)
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let peers = self.peers.read().await;
        for id in ids {
            if let Some(peer) = peers.get(id) {
                deliver(*id, peer, msg.clone());
            }
        }
    }

    pub async fn broadcast_all(&self, msg: &ServerMessage) {
        let peers = self.peers.read().await;
        for (id, peer) in peers.iter() {
            deliver(*id, peer, msg.clone());
        }
    }
}

fn deliver(id: ConnectionId, peer: &Peer, msg: ServerMessage) {
    // The receiving half goes away when the writer task ends; teardown follows shortly.
    if peer.outbox.send(msg).is_err() {
        error!("Failed to queue message for connection {}", id);
    }
}
