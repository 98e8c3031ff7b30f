use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one live WebSocket connection (one browser tab, one channel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which endpoint a connection came in through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// JSON event channel (`/ws`).
    Events,
    /// Document streaming channel (`/yjs/...`). Fragments travel as binary frames.
    Document,
}

#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub id: ConnectionId,
    pub kind: ChannelKind,
    /// Routing key of the document channel; `None` on the event channel.
    pub document: Option<String>,
}

impl ConnCtx {
    pub fn events() -> Self {
        Self {
            id: ConnectionId::new(),
            kind: ChannelKind::Events,
            document: None,
        }
    }

    pub fn document(name: String) -> Self {
        Self {
            id: ConnectionId::new(),
            kind: ChannelKind::Document,
            document: Some(name),
        }
    }
}
