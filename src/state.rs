use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    presence_relay::PresenceRelay,
    session_registry::SessionRegistry,
    survey::{SurveyStateMachine, TagLimits},
    update_relay::UpdateRelay,
};
use crate::ws::peers::PeerDirectory;

/// Process-wide services handed to every connection and HTTP handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub peers: Arc<PeerDirectory>,
    pub sessions: SessionRegistry,
    pub docs: UpdateRelay,
    pub presence: PresenceRelay,
    pub survey: SurveyStateMachine,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let peers = Arc::new(PeerDirectory::new());
        let limits = TagLimits {
            max_tags: config.survey_max_tags,
            max_tag_len: config.survey_max_tag_len,
        };
        Arc::new(Self {
            sessions: SessionRegistry::new(peers.clone(), config.inactivity_window()),
            docs: UpdateRelay::new(peers.clone()),
            presence: PresenceRelay::new(peers.clone()),
            survey: SurveyStateMachine::new(peers.clone(), limits),
            peers,
            config: Arc::new(config),
            started_at: Utc::now(),
        })
    }
}
