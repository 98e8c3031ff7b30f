//! Error taxonomy for the relay.

use thiserror::Error;

/// Display-name handshake failures. Surfaced to the client in the `auth_result` ack.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Display name cannot be empty")]
    EmptyName,

    #[error("Connection is not registered")]
    NotConnected,
}

/// An update fragment that the document model refused or that targets a document nobody
/// joined, or a state that could not be encoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("Update fragment rejected for document '{document}': {reason}")]
    Rejected { document: String, reason: String },

    #[error("Document '{document}' has not been joined")]
    UnknownDocument { document: String },

    #[error("Failed to encode state of document '{document}': {reason}")]
    Encode { document: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurveyError {
    #[error("This connection already submitted its answers")]
    AlreadySubmitted,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] axum::Error),

    #[error("Failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a connection went away. Every variant leads to the same teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    Transport(String),
    InactivityTimeout,
    HandlerAborted,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            DisconnectReason::ClientClosed => "client-closed",
            DisconnectReason::Transport(_) => "transport-error",
            DisconnectReason::InactivityTimeout => "inactivity-timeout",
            DisconnectReason::HandlerAborted => "handler-aborted",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Transport(detail) => write!(f, "{} ({})", self.as_str(), detail),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}
