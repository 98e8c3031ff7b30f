use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::watchdog::Watchdog;
use crate::error::AuthError;
use crate::models::{MemberLeftMessage, OnlineCountMessage, ServerMessage};
use crate::ws::{connctx::ConnectionId, peers::PeerDirectory};

/// Every authorized connection joins this room.
pub const MAIN_ROOM: &str = "main";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub room_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RoomState {
    pub name: String,
    pub member_connection_ids: HashSet<ConnectionId>,
}

struct ConnEntry {
    watchdog: Watchdog,
    session: Option<ClientSession>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<ConnectionId, ConnEntry>,
    rooms: HashMap<String, RoomState>,
}

impl Registry {
    fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|r| r.member_connection_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |r| r.member_connection_ids.len())
    }
}

/// Live connections, their watchdogs, and who is in the room.
pub struct SessionRegistry {
    inner: Mutex<Registry>,
    peers: Arc<PeerDirectory>,
    inactivity_window: Duration,
}

impl SessionRegistry {
    pub fn new(peers: Arc<PeerDirectory>, inactivity_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
            peers,
            inactivity_window,
        }
    }

    /// Creates the placeholder for a fresh connection and arms its watchdog.
    pub async fn register<F>(&self, id: ConnectionId, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let watchdog = Watchdog::start(self.inactivity_window, on_expire);
        let mut registry = self.inner.lock().await;
        if let Some(previous) = registry.entries.insert(id, ConnEntry { watchdog, session: None }) {
            previous.watchdog.cancel();
        }
        debug!("Registered connection {}", id);
    }

    /// Records activity on a connection.
    pub async fn touch(&self, id: ConnectionId) {
        if let Some(entry) = self.inner.lock().await.entries.get(&id) {
            entry.watchdog.touch();
        }
    }

    pub async fn authorize(&self, id: ConnectionId, display_name: &str) -> Result<ClientSession, AuthError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::EmptyName);
        }

        let mut registry = self.inner.lock().await;
        let entry = registry.entries.get_mut(&id).ok_or(AuthError::NotConnected)?;
        entry.watchdog.touch();

        let session = ClientSession {
            connection_id: id,
            display_name: display_name.to_string(),
            room_name: MAIN_ROOM.to_string(),
            joined_at: Utc::now(),
        };
        entry.session = Some(session.clone());

        let room = registry
            .rooms
            .entry(MAIN_ROOM.to_string())
            .or_insert_with(|| RoomState {
                name: MAIN_ROOM.to_string(),
                member_connection_ids: HashSet::new(),
            });
        room.member_connection_ids.insert(id);
        let count = room.member_connection_ids.len();
        info!("User '{}' authorized in room '{}' ({} online)", session.display_name, room.name, count);

        let members = registry.room_members(MAIN_ROOM);
        let msg = ServerMessage::OnlineCount(OnlineCountMessage { count });
        self.peers.send_to_many(members.iter(), &msg).await;

        Ok(session)
    }

    /// Drops the connection and its session, cancelling the watchdog before anything else.
    pub async fn unregister(&self, id: ConnectionId) -> Option<ClientSession> {
        let mut registry = self.inner.lock().await;
        let entry = registry.entries.remove(&id)?;
        entry.watchdog.cancel();

        let session = entry.session?;
        if let Some(room) = registry.rooms.get_mut(&session.room_name) {
            room.member_connection_ids.remove(&id);
        }

        let members = registry.room_members(&session.room_name);
        let count = registry.count(&session.room_name);
        info!("User '{}' left room '{}' ({} online)", session.display_name, session.room_name, count);

        self.peers
            .send_to_many(members.iter(), &ServerMessage::OnlineCount(OnlineCountMessage { count }))
            .await;
        let left = ServerMessage::MemberLeft(MemberLeftMessage {
            connection_id: id,
            display_name: session.display_name.clone(),
            room_name: session.room_name.clone(),
        });
        self.peers.send_to_many(members.iter(), &left).await;

        Some(session)
    }

    pub async fn count(&self, room_name: &str) -> usize {
        self.inner.lock().await.count(room_name)
    }

    pub async fn session(&self, id: ConnectionId) -> Option<ClientSession> {
        self.inner
            .lock()
            .await
            .entries
            .get(&id)
            .and_then(|e| e.session.clone())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
