use loro::{ExportMode, LoroDoc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::MergeError;
use crate::models::{DocUpdateMessage, ServerMessage};
use crate::ws::{connctx::ConnectionId, peers::PeerDirectory};

/// Server-held replica of one document plus the connections bound to it.
///
/// Handles are created lazily on first join and kept for the life of the process.
pub struct DocumentHandle {
    doc: LoroDoc,
    subscribers: HashSet<ConnectionId>,
}

impl DocumentHandle {
    fn new() -> Self {
        Self {
            doc: LoroDoc::new(),
            subscribers: HashSet::new(),
        }
    }

    fn encode_state(&self, name: &str) -> Result<Vec<u8>, MergeError> {
        self.doc.export(ExportMode::Snapshot).map_err(|e| MergeError::Encode {
            document: name.to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct UpdateRelay {
    documents: Mutex<HashMap<String, DocumentHandle>>,
    peers: Arc<PeerDirectory>,
}

impl UpdateRelay {
    pub fn new(peers: Arc<PeerDirectory>) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            peers,
        }
    }

    /// Binds the connection to the document and returns its full encoded state.
    pub async fn join(&self, id: ConnectionId, document_name: &str) -> Result<Vec<u8>, MergeError> {
        let mut documents = self.documents.lock().await;
        let handle = documents.entry(document_name.to_string()).or_insert_with(|| {
            info!("Created document '{}'", document_name);
            DocumentHandle::new()
        });
        handle.subscribers.insert(id);
        debug!("Connection {} joined document '{}' ({} bound)", id, document_name, handle.subscribers.len());
        handle.encode_state(document_name)
    }

    /// Merges the fragment into the server replica, then forwards the untouched bytes to
    /// every other bound connection. A fragment that fails to merge is never forwarded,
    /// and documents are only ever created by [`UpdateRelay::join`].
    ///
    /// Returns how many peers the fragment was forwarded to.
    pub async fn apply_and_broadcast(
        &self,
        id: ConnectionId,
        document_name: &str,
        fragment: Vec<u8>,
    ) -> Result<usize, MergeError> {
        let mut documents = self.documents.lock().await;
        let Some(handle) = documents.get_mut(document_name) else {
            warn!(
                "Dropping update fragment from {} for unjoined document '{}' ({} bytes)",
                id,
                document_name,
                fragment.len()
            );
            return Err(MergeError::UnknownDocument {
                document: document_name.to_string(),
            });
        };

        if let Err(e) = handle.doc.import(&fragment) {
            warn!(
                "Dropping update fragment from {} for document '{}' ({} bytes): {}",
                id,
                document_name,
                fragment.len(),
                e
            );
            return Err(MergeError::Rejected {
                document: document_name.to_string(),
                reason: e.to_string(),
            });
        }

        let recipients: Vec<ConnectionId> = handle.subscribers.iter().filter(|s| **s != id).copied().collect();
        let msg = ServerMessage::DocUpdate(DocUpdateMessage {
            document_name: document_name.to_string(),
            fragment,
        });
        self.peers.send_to_many(recipients.iter(), &msg).await;
        Ok(recipients.len())
    }

    pub async fn leave_all(&self, id: ConnectionId) {
        for handle in self.documents.lock().await.values_mut() {
            handle.subscribers.remove(&id);
        }
    }

    /// Runs `read` against the server replica, if the document exists.
    pub async fn with_document<R>(&self, document_name: &str, read: impl FnOnce(&LoroDoc) -> R) -> Option<R> {
        let documents = self.documents.lock().await;
        documents.get(document_name).map(|h| read(&h.doc))
    }

    pub async fn document_count(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.documents.lock().await.values().map(|h| h.subscribers.len()).sum()
    }
}
