//! Ephemeral per-client presence (cursor, pointer, display identity).
//!
//! The relay keeps one table per document and forwards only the difference a publish
//! produced. Peers still expire records on their own TTL; see [`PresenceRelay::expire_stale`]
//! for the optional server-side sweep.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::{PresenceDiffMessage, PresenceFields, PresenceState, ServerMessage};
use crate::ws::{connctx::ConnectionId, peers::PeerDirectory};

#[derive(Clone, Debug, PartialEq)]
pub struct PresenceRecord {
    pub client_id: String,
    pub owner: ConnectionId,
    pub fields: PresenceFields,
    /// Epoch milliseconds of the last publish that touched this record.
    pub last_seen: i64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PresenceDiff {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Classifies an incoming publish against the records already held.
///
/// Unchanged records are in none of the lists. An id listed in `removed` is only
/// reported when it was held, and removal wins over a state for the same id.
pub fn diff_snapshots(
    previous: &HashMap<String, PresenceRecord>,
    incoming: &BTreeMap<String, PresenceFields>,
    removed: &HashSet<String>,
) -> PresenceDiff {
    let mut diff = PresenceDiff::default();
    for (client_id, fields) in incoming {
        if removed.contains(client_id) {
            continue;
        }
        match previous.get(client_id) {
            None => diff.added.push(client_id.clone()),
            Some(record) if record.fields != *fields => diff.updated.push(client_id.clone()),
            Some(_) => {}
        }
    }
    diff.removed = removed.iter().filter(|id| previous.contains_key(*id)).cloned().collect();
    diff.removed.sort();
    diff
}

#[derive(Default)]
struct PresenceRoom {
    records: HashMap<String, PresenceRecord>,
    subscribers: HashSet<ConnectionId>,
}

impl PresenceRoom {
    fn diff_message(&self, document_name: &str, diff: PresenceDiff) -> ServerMessage {
        let states = diff
            .added
            .iter()
            .chain(diff.updated.iter())
            .filter_map(|id| self.records.get(id))
            .map(|r| {
                (
                    r.client_id.clone(),
                    PresenceState {
                        fields: r.fields.clone(),
                        last_seen: r.last_seen,
                    },
                )
            })
            .collect();
        ServerMessage::PresenceDiff(PresenceDiffMessage {
            document_name: document_name.to_string(),
            states,
            added: diff.added,
            updated: diff.updated,
            removed: diff.removed,
        })
    }

    fn others(&self, id: ConnectionId) -> Vec<ConnectionId> {
        self.subscribers.iter().filter(|s| **s != id).copied().collect()
    }
}

pub struct PresenceRelay {
    rooms: Mutex<HashMap<String, PresenceRoom>>,
    peers: Arc<PeerDirectory>,
}

impl PresenceRelay {
    pub fn new(peers: Arc<PeerDirectory>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            peers,
        }
    }

    /// Subscribes the connection to the document's presence set. Returns the current
    /// table as an all-`added` diff, or `None` when the table is empty.
    pub async fn bind(&self, id: ConnectionId, document_name: &str) -> Option<ServerMessage> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(document_name.to_string()).or_default();
        room.subscribers.insert(id);
        if room.records.is_empty() {
            return None;
        }
        let mut added: Vec<String> = room.records.keys().cloned().collect();
        added.sort();
        Some(room.diff_message(
            document_name,
            PresenceDiff {
                added,
                ..Default::default()
            },
        ))
    }

    pub async fn publish(
        &self,
        id: ConnectionId,
        document_name: &str,
        states: BTreeMap<String, PresenceFields>,
        removed: HashSet<String>,
    ) -> PresenceDiff {
        self.publish_at(id, document_name, states, removed, Utc::now().timestamp_millis())
            .await
    }

    /// Merges a publish into the table and forwards the resulting diff to the other
    /// subscribers. Records belong to the connection that first published them. Only
    /// connections bound to the document may publish.
    pub async fn publish_at(
        &self,
        id: ConnectionId,
        document_name: &str,
        mut states: BTreeMap<String, PresenceFields>,
        mut removed: HashSet<String>,
        now: i64,
    ) -> PresenceDiff {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get_mut(document_name).filter(|r| r.subscribers.contains(&id)) else {
            debug!("Ignoring presence from {} for unbound document '{}'", id, document_name);
            return PresenceDiff::default();
        };

        let foreign = |client_id: &String| matches!(room.records.get(client_id), Some(r) if r.owner != id);
        states.retain(|client_id, _| {
            let keep = !foreign(client_id);
            if !keep {
                warn!("Connection {} tried to overwrite presence of client {}", id, client_id);
            }
            keep
        });
        removed.retain(|client_id| {
            let keep = !foreign(client_id);
            if !keep {
                debug!("Ignoring removal hint for client {} from non-owner {}", client_id, id);
            }
            keep
        });

        let diff = diff_snapshots(&room.records, &states, &removed);

        for client_id in &diff.removed {
            room.records.remove(client_id);
        }
        for (client_id, fields) in states {
            if removed.contains(&client_id) {
                continue;
            }
            room.records.insert(
                client_id.clone(),
                PresenceRecord {
                    client_id,
                    owner: id,
                    fields,
                    last_seen: now,
                },
            );
        }

        if diff.is_empty() {
            return diff;
        }

        let recipients = room.others(id);
        let msg = room.diff_message(
            document_name,
            PresenceDiff {
                added: diff.added.clone(),
                updated: diff.updated.clone(),
                removed: diff.removed.clone(),
            },
        );
        self.peers.send_to_many(recipients.iter(), &msg).await;
        diff
    }

    /// Unsubscribes the connection everywhere and removes the records it owned.
    pub async fn unbind(&self, id: ConnectionId) {
        let mut rooms = self.rooms.lock().await;
        for (document_name, room) in rooms.iter_mut() {
            room.subscribers.remove(&id);
            let mut removed: Vec<String> = room
                .records
                .values()
                .filter(|r| r.owner == id)
                .map(|r| r.client_id.clone())
                .collect();
            if removed.is_empty() {
                continue;
            }
            removed.sort();
            for client_id in &removed {
                room.records.remove(client_id);
            }
            debug!("Purged {} presence record(s) of {} in '{}'", removed.len(), id, document_name);

            let msg = room.diff_message(
                document_name,
                PresenceDiff {
                    removed,
                    ..Default::default()
                },
            );
            self.peers.send_to_many(room.subscribers.iter(), &msg).await;
        }
    }

    /// Removes records not refreshed within `ttl_ms` of `now`. Check and delete happen
    /// under one lock, so a record already removed explicitly is simply not found.
    pub async fn expire_stale(&self, now: i64, ttl_ms: i64) -> usize {
        let mut rooms = self.rooms.lock().await;
        let mut expired_total = 0;
        for (document_name, room) in rooms.iter_mut() {
            let mut expired: Vec<String> = room
                .records
                .values()
                .filter(|r| now - r.last_seen > ttl_ms)
                .map(|r| r.client_id.clone())
                .collect();
            if expired.is_empty() {
                continue;
            }
            expired.sort();
            for client_id in &expired {
                room.records.remove(client_id);
            }
            expired_total += expired.len();
            debug!("Expired {} stale presence record(s) in '{}'", expired.len(), document_name);

            let msg = room.diff_message(
                document_name,
                PresenceDiff {
                    removed: expired,
                    ..Default::default()
                },
            );
            self.peers.send_to_many(room.subscribers.iter(), &msg).await;
        }
        expired_total
    }

    pub async fn record_count(&self) -> usize {
        self.rooms.lock().await.values().map(|r| r.records.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connctx::ChannelKind;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn fields(value: serde_json::Value) -> PresenceFields {
        value.as_object().cloned().unwrap()
    }

    fn record(client_id: &str, owner: ConnectionId, value: serde_json::Value) -> PresenceRecord {
        PresenceRecord {
            client_id: client_id.to_string(),
            owner,
            fields: fields(value),
            last_seen: 0,
        }
    }

    fn states(entries: &[(&str, serde_json::Value)]) -> BTreeMap<String, PresenceFields> {
        entries.iter().map(|(id, v)| (id.to_string(), fields(v.clone()))).collect()
    }

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn subscriber(
        relay: &PresenceRelay,
        peers: &PeerDirectory,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        peers.attach(id, ChannelKind::Events, tx).await;
        relay.bind(id, "main").await;
        (id, rx)
    }

    fn setup() -> (PresenceRelay, Arc<PeerDirectory>) {
        let peers = Arc::new(PeerDirectory::new());
        (PresenceRelay::new(peers.clone()), peers)
    }

    fn diff_of(msg: ServerMessage) -> PresenceDiffMessage {
        match msg {
            ServerMessage::PresenceDiff(d) => d,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_diff_classifies_added_updated_removed() {
        // given:
        let owner = ConnectionId::new();
        let previous: HashMap<String, PresenceRecord> = [
            ("1".to_string(), record("1", owner, json!({"mouse": {"x": 1, "y": 1}}))),
            ("2".to_string(), record("2", owner, json!({"mouse": {"x": 5, "y": 5}}))),
            ("3".to_string(), record("3", owner, json!({"user": {"name": "Ann"}}))),
        ]
        .into_iter()
        .collect();
        let incoming = states(&[
            ("1", json!({"mouse": {"x": 2, "y": 1}})),
            ("2", json!({"mouse": {"x": 5, "y": 5}})),
            ("4", json!({"user": {"name": "Bob"}})),
        ]);

        // when:
        let diff = diff_snapshots(&previous, &incoming, &ids(&["3", "9"]));

        // then:
        assert_eq!(diff.added, vec!["4".to_string()]);
        assert_eq!(diff.updated, vec!["1".to_string()]);
        assert_eq!(diff.removed, vec!["3".to_string()]);
    }

    #[test]
    fn test_diff_removal_wins_over_state() {
        let owner = ConnectionId::new();
        let previous: HashMap<String, PresenceRecord> =
            [("1".to_string(), record("1", owner, json!({"a": 1})))].into_iter().collect();

        let diff = diff_snapshots(&previous, &states(&[("1", json!({"a": 2})), ("5", json!({}))]), &ids(&["1", "5"]));

        assert!(diff.added.is_empty());
        assert!(diff.updated.is_empty());
        assert_eq!(diff.removed, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_identical_publish_broadcasts_once() {
        // given:
        let (relay, peers) = setup();
        let (a, mut a_rx) = subscriber(&relay, &peers).await;
        let (_b, mut b_rx) = subscriber(&relay, &peers).await;
        let cursor = states(&[("11", json!({"user": {"name": "Ann", "color": "#FF0000"}, "cursor": {"line": 3}}))]);

        // when:
        let first = relay.publish_at(a, "main", cursor.clone(), HashSet::new(), 1_000).await;
        let second = relay.publish_at(a, "main", cursor.clone(), HashSet::new(), 2_000).await;

        // then:
        assert_eq!(first.added, vec!["11".to_string()]);
        assert!(second.is_empty());
        let msg = diff_of(b_rx.try_recv().unwrap());
        assert_eq!(msg.added, vec!["11".to_string()]);
        assert_eq!(msg.states["11"].last_seen, 1_000);
        assert!(b_rx.try_recv().is_err());
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_changed_fields_are_updates() {
        let (relay, peers) = setup();
        let (a, _a_rx) = subscriber(&relay, &peers).await;
        let (_b, mut b_rx) = subscriber(&relay, &peers).await;

        relay.publish_at(a, "main", states(&[("11", json!({"mouse": {"x": 1}}))]), HashSet::new(), 1).await;
        relay.publish_at(a, "main", states(&[("11", json!({"mouse": {"x": 2}}))]), HashSet::new(), 2).await;

        let _added = b_rx.try_recv().unwrap();
        let msg = diff_of(b_rx.try_recv().unwrap());
        assert_eq!(msg.updated, vec!["11".to_string()]);
        assert_eq!(msg.states["11"].fields["mouse"]["x"], 2);
    }

    #[tokio::test]
    async fn test_foreign_records_are_protected() {
        // given:
        let (relay, peers) = setup();
        let (a, _a_rx) = subscriber(&relay, &peers).await;
        let (b, _b_rx) = subscriber(&relay, &peers).await;
        relay.publish_at(a, "main", states(&[("11", json!({"x": 1}))]), HashSet::new(), 1).await;

        // when:
        let overwrite = relay.publish_at(b, "main", states(&[("11", json!({"x": 9}))]), HashSet::new(), 2).await;
        let removal = relay.publish_at(b, "main", BTreeMap::new(), ids(&["11"]), 3).await;

        // then:
        assert!(overwrite.is_empty());
        assert!(removal.is_empty());
        assert_eq!(relay.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_from_unbound_connection_is_ignored() {
        // given:
        let (relay, peers) = setup();
        let (_a, mut a_rx) = subscriber(&relay, &peers).await;
        let stranger = ConnectionId::new();

        // when:
        let elsewhere = relay.publish_at(stranger, "junk", states(&[("7", json!({"x": 1}))]), HashSet::new(), 1).await;
        let here = relay.publish_at(stranger, "main", states(&[("8", json!({"x": 1}))]), HashSet::new(), 1).await;

        // then:
        assert!(elsewhere.is_empty());
        assert!(here.is_empty());
        assert_eq!(relay.record_count().await, 0);
        assert_eq!(relay.rooms.lock().await.len(), 1);
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bind_returns_existing_records() {
        let (relay, peers) = setup();
        let (a, _a_rx) = subscriber(&relay, &peers).await;
        relay.publish_at(a, "main", states(&[("11", json!({"x": 1}))]), HashSet::new(), 1).await;

        let initial = relay.bind(ConnectionId::new(), "main").await.map(diff_of).unwrap();

        assert_eq!(initial.added, vec!["11".to_string()]);
        assert!(initial.states.contains_key("11"));
        assert!(relay.bind(ConnectionId::new(), "empty").await.is_none());
    }

    #[tokio::test]
    async fn test_unbind_purges_owned_records() {
        // given:
        let (relay, peers) = setup();
        let (a, _a_rx) = subscriber(&relay, &peers).await;
        let (_b, mut b_rx) = subscriber(&relay, &peers).await;
        relay.publish_at(a, "main", states(&[("11", json!({"x": 1})), ("12", json!({"x": 2}))]), HashSet::new(), 1).await;
        let _added = b_rx.try_recv().unwrap();

        // when:
        peers.detach(a).await;
        relay.unbind(a).await;

        // then:
        let msg = diff_of(b_rx.try_recv().unwrap());
        assert_eq!(msg.removed, vec!["11".to_string(), "12".to_string()]);
        assert_eq!(relay.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_expire_stale_is_noop_after_explicit_removal() {
        // given:
        let (relay, peers) = setup();
        let (a, _a_rx) = subscriber(&relay, &peers).await;
        let (_b, mut b_rx) = subscriber(&relay, &peers).await;
        relay.publish_at(a, "main", states(&[("11", json!({"x": 1}))]), HashSet::new(), 1_000).await;
        relay.publish_at(a, "main", states(&[("12", json!({"x": 1}))]), HashSet::new(), 9_000).await;
        relay.publish_at(a, "main", BTreeMap::new(), ids(&["12"]), 9_500).await;
        while b_rx.try_recv().is_ok() {}

        // when:
        let expired = relay.expire_stale(12_000, 10_000).await;
        let again = relay.expire_stale(12_000, 10_000).await;

        // then:
        assert_eq!(expired, 1);
        assert_eq!(again, 0);
        let msg = diff_of(b_rx.try_recv().unwrap());
        assert_eq!(msg.removed, vec!["11".to_string()]);
        assert!(b_rx.try_recv().is_err());
    }
}
