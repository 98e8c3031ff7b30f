//! Multi-tab survey ("bubble") aggregation.
//!
//! Per user: `NotAnswering -> Answering(tabs > 0) -> Answered`. Once every user who
//! began answering has submitted or left, and at least one submission exists, a single
//! `survey_ready` carrying all collected tags goes to every connection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SurveyError;
use crate::models::{ServerMessage, SurveyReadyMessage, SurveyStats};
use crate::ws::{connctx::ConnectionId, peers::PeerDirectory};

#[derive(Clone, Copy, Debug)]
pub struct TagLimits {
    pub max_tags: usize,
    pub max_tag_len: usize,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self {
            max_tags: 10,
            max_tag_len: 64,
        }
    }
}

/// Trims, drops empties, truncates each tag to `max_tag_len` characters and keeps at
/// most `max_tags` of them.
pub fn sanitize_tags(tags: Vec<String>, limits: TagLimits) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().chars().take(limits.max_tag_len).collect::<String>())
        .map(|t| t.trim_end().to_string())
        .filter(|t| !t.is_empty())
        .take(limits.max_tags)
        .collect()
}

#[derive(Debug, Default)]
pub struct SurveyState {
    /// Open, still-answering tabs per user.
    pub answering_counts: HashMap<String, u32>,
    pub answered_users: HashSet<String>,
    pub collected_tags: Vec<String>,
    pub ready_emitted: bool,
}

impl SurveyState {
    pub fn stats(&self) -> SurveyStats {
        SurveyStats {
            answering: self.answering_counts.len(),
            answered: self.answered_users.len(),
        }
    }

    fn quorum_reached(&self) -> bool {
        !self.ready_emitted && self.answering_counts.is_empty() && !self.answered_users.is_empty()
    }

    fn decrement(&mut self, user_id: &str) {
        if let Some(count) = self.answering_counts.get_mut(user_id) {
            *count -= 1;
            if *count == 0 {
                self.answering_counts.remove(user_id);
            }
        }
    }
}

/// Per-connection (per-tab) flags.
#[derive(Debug, Default)]
struct SurveyTab {
    user_id: Option<String>,
    answering: bool,
    submitted: bool,
}

#[derive(Default)]
struct SurveyInner {
    state: SurveyState,
    tabs: HashMap<ConnectionId, SurveyTab>,
}

pub struct SurveyStateMachine {
    inner: Mutex<SurveyInner>,
    peers: Arc<PeerDirectory>,
    limits: TagLimits,
}

impl SurveyStateMachine {
    pub fn new(peers: Arc<PeerDirectory>, limits: TagLimits) -> Self {
        Self {
            inner: Mutex::new(SurveyInner::default()),
            peers,
            limits,
        }
    }

    pub async fn join(&self, id: ConnectionId, user_id: &str) {
        let mut inner = self.inner.lock().await;
        let SurveyInner { state, tabs } = &mut *inner;
        let tab = tabs.entry(id).or_default();
        if tab.answering || tab.submitted {
            debug!("Survey join ignored for connection {}", id);
            return;
        }
        // Only a tab that holds no count may change identity
        tab.user_id = Some(user_id.to_string());

        if state.answered_users.contains(user_id) {
            debug!("User {} already answered; not counted as answering", user_id);
            return;
        }

        tab.answering = true;
        *state.answering_counts.entry(user_id.to_string()).or_insert(0) += 1;
        self.after_change(state).await;
    }

    pub async fn leave(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        let SurveyInner { state, tabs } = &mut *inner;
        let Some(tab) = tabs.get_mut(&id) else {
            return;
        };
        if tab.submitted || !tab.answering {
            return;
        }
        tab.answering = false;
        if let Some(user_id) = &tab.user_id {
            state.decrement(user_id);
        }
        self.after_change(state).await;
    }

    /// First submission on a connection ends the user's answering, whatever other tabs
    /// are open. Later submissions on the same connection return
    /// [`SurveyError::AlreadySubmitted`] without touching the state.
    pub async fn submit(
        &self,
        id: ConnectionId,
        fallback_user_id: &str,
        tags: Vec<String>,
    ) -> Result<SurveyStats, SurveyError> {
        let mut inner = self.inner.lock().await;
        let SurveyInner { state, tabs } = &mut *inner;
        let tab = tabs.entry(id).or_default();
        if tab.submitted {
            return Err(SurveyError::AlreadySubmitted);
        }
        tab.submitted = true;
        tab.answering = false;
        let user_id = tab.user_id.get_or_insert_with(|| fallback_user_id.to_string()).clone();

        state.answering_counts.remove(&user_id);
        state.answered_users.insert(user_id.clone());
        let tags = sanitize_tags(tags, self.limits);
        info!("User {} submitted survey with {} tag(s)", user_id, tags.len());
        state.collected_tags.extend(tags);

        self.after_change(state).await;
        Ok(state.stats())
    }

    /// A dropped connection counts as an explicit leave.
    pub async fn disconnect(&self, id: ConnectionId) {
        self.leave(id).await;
        self.inner.lock().await.tabs.remove(&id);
    }

    /// Survey identity bound to the connection, if it joined or submitted.
    pub async fn user_of(&self, id: ConnectionId) -> Option<String> {
        self.inner.lock().await.tabs.get(&id).and_then(|tab| tab.user_id.clone())
    }

    pub async fn stats(&self) -> SurveyStats {
        self.inner.lock().await.state.stats()
    }

    pub async fn ready_emitted(&self) -> bool {
        self.inner.lock().await.state.ready_emitted
    }

    async fn after_change(&self, state: &mut SurveyState) {
        self.peers.broadcast_all(&ServerMessage::SurveyStats(state.stats())).await;

        if state.quorum_reached() {
            state.ready_emitted = true;
            info!(
                "Survey ready: {} user(s) answered, {} tag(s)",
                state.answered_users.len(),
                state.collected_tags.len()
            );
            let ready = ServerMessage::SurveyReady(SurveyReadyMessage {
                tags: state.collected_tags.clone(),
            });
            self.peers.broadcast_all(&ready).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connctx::ChannelKind;
    use tokio::sync::mpsc;

    fn setup() -> (SurveyStateMachine, Arc<PeerDirectory>) {
        let peers = Arc::new(PeerDirectory::new());
        (SurveyStateMachine::new(peers.clone(), TagLimits::default()), peers)
    }

    async fn observer(peers: &PeerDirectory) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        peers.attach(ConnectionId::new(), ChannelKind::Events, tx).await;
        rx
    }

    fn ready_events(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::SurveyReady(r) = msg {
                out.push(r.tags);
            }
        }
        out
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ready_fires_once_after_quorum() {
        // given: U1 with one tab, U2 with two tabs, one of which leaves
        let (survey, peers) = setup();
        let mut rx = observer(&peers).await;
        let (u1, u2_tab1, u2_tab2) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        survey.join(u1, "U1").await;
        survey.join(u2_tab1, "U2").await;
        survey.join(u2_tab2, "U2").await;
        survey.leave(u2_tab2).await;
        assert!(ready_events(&mut rx).is_empty());

        // when: U2 submits from the remaining tab
        let stats = survey.submit(u2_tab1, "U2", tags(&["flex", "grid"])).await.unwrap();

        // then: U1 is still answering
        assert_eq!(stats, SurveyStats { answering: 1, answered: 1 });
        assert!(ready_events(&mut rx).is_empty());

        // when: U1 submits
        survey.submit(u1, "U1", tags(&["colors"])).await.unwrap();

        // then:
        assert_eq!(ready_events(&mut rx), vec![tags(&["flex", "grid", "colors"])]);
        assert!(survey.ready_emitted().await);

        // and a newcomer never re-fires it
        survey.join(ConnectionId::new(), "U3").await;
        assert!(ready_events(&mut rx).is_empty());
        assert_eq!(survey.stats().await, SurveyStats { answering: 1, answered: 2 });
    }

    #[tokio::test]
    async fn test_submit_is_idempotent_per_connection() {
        // given:
        let (survey, peers) = setup();
        let mut rx = observer(&peers).await;
        let tab = ConnectionId::new();
        let other = ConnectionId::new();
        survey.join(tab, "U1").await;
        survey.join(other, "U9").await;
        survey.submit(tab, "U1", tags(&["a"])).await.unwrap();
        while rx.try_recv().is_ok() {}

        // when:
        let second = survey.submit(tab, "U1", tags(&["b", "c"])).await;

        // then:
        assert_eq!(second, Err(SurveyError::AlreadySubmitted));
        assert!(rx.try_recv().is_err());
        let inner = survey.inner.lock().await;
        assert_eq!(inner.state.collected_tags, tags(&["a"]));
        assert_eq!(inner.state.answered_users.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_join_keeps_the_counted_identity() {
        // given: a tab counted as U1 tries to rejoin as U2
        let (survey, peers) = setup();
        let mut rx = observer(&peers).await;
        let (tab, other) = (ConnectionId::new(), ConnectionId::new());
        survey.join(tab, "U1").await;
        survey.join(tab, "U2").await;
        survey.join(other, "U9").await;
        survey.submit(other, "U9", tags(&["x"])).await.unwrap();
        assert!(ready_events(&mut rx).is_empty());
        assert_eq!(survey.user_of(tab).await.as_deref(), Some("U1"));

        // when:
        survey.leave(tab).await;

        // then: U1 is released and the quorum is reached
        assert_eq!(survey.stats().await, SurveyStats { answering: 0, answered: 1 });
        assert_eq!(ready_events(&mut rx), vec![tags(&["x"])]);
    }

    #[tokio::test]
    async fn test_disconnect_mid_answer_counts_as_leave() {
        // given:
        let (survey, peers) = setup();
        let mut rx = observer(&peers).await;
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        survey.join(a, "Ann").await;
        survey.join(b, "Bob").await;
        survey.submit(a, "Ann", tags(&["x"])).await.unwrap();
        assert!(ready_events(&mut rx).is_empty());

        // when:
        survey.disconnect(b).await;

        // then:
        assert_eq!(ready_events(&mut rx), vec![tags(&["x"])]);
    }

    #[tokio::test]
    async fn test_everyone_leaving_without_submission_is_not_ready() {
        let (survey, peers) = setup();
        let mut rx = observer(&peers).await;
        let a = ConnectionId::new();

        survey.join(a, "Ann").await;
        survey.leave(a).await;
        survey.leave(a).await;

        assert!(ready_events(&mut rx).is_empty());
        assert_eq!(survey.stats().await, SurveyStats::default());
    }

    #[tokio::test]
    async fn test_leave_after_submit_does_not_touch_counts() {
        // given: Ann has two tabs, one submits
        let (survey, _peers) = setup();
        let (tab1, tab2, bob) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        survey.join(tab1, "Ann").await;
        survey.join(tab2, "Ann").await;
        survey.join(bob, "Bob").await;
        survey.submit(tab1, "Ann", Vec::new()).await.unwrap();

        // when: the submitting tab and the stale tab both leave
        survey.leave(tab1).await;
        survey.leave(tab2).await;

        // then: Bob is untouched
        assert_eq!(survey.stats().await, SurveyStats { answering: 1, answered: 1 });
    }

    #[tokio::test]
    async fn test_join_after_answering_does_not_count() {
        let (survey, _peers) = setup();
        let (tab1, tab2) = (ConnectionId::new(), ConnectionId::new());
        survey.join(tab1, "Ann").await;
        survey.join(tab1, "Ann").await;
        assert_eq!(survey.stats().await.answering, 1);

        survey.submit(tab1, "Ann", Vec::new()).await.unwrap();
        survey.join(tab2, "Ann").await;

        assert_eq!(survey.stats().await, SurveyStats { answering: 0, answered: 1 });
    }

    #[tokio::test]
    async fn test_submit_without_join_uses_fallback_identity() {
        let (survey, _peers) = setup();
        let stats = survey.submit(ConnectionId::new(), "Ann", tags(&["solo"])).await.unwrap();
        assert_eq!(stats, SurveyStats { answering: 0, answered: 1 });
        assert!(survey.ready_emitted().await);
    }

    #[test]
    fn test_sanitize_tags() {
        let limits = TagLimits {
            max_tags: 3,
            max_tag_len: 5,
        };
        let cleaned = sanitize_tags(tags(&["  grid ", "", "   ", "flexbox", "a b", "extra"]), limits);
        assert_eq!(cleaned, tags(&["grid", "flexb", "a b"]));
    }
}
