use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, base64::Base64};
use std::collections::BTreeMap;

use crate::ws::connctx::ConnectionId;

/// Free-form presence fields of one client (`user`, `cursor`, `mouse`, ...).
pub type PresenceFields = Map<String, Value>;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthMessage {
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DocJoinMessage {
    pub document_name: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocUpdateMessage {
    pub document_name: String,
    #[serde_as(as = "Base64")]
    pub fragment: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PresencePublishMessage {
    pub document_name: String,
    #[serde(default)]
    pub states: BTreeMap<String, PresenceFields>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SurveyTabMessage {
    #[serde(default)]
    pub client_tab_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SurveySubmitMessage {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Everything a client may send. Unknown `type` tags fail to parse and are rejected.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth(AuthMessage),
    Activity,
    PresencePing,
    DocJoin(DocJoinMessage),
    DocUpdate(DocUpdateMessage),
    PresencePublish(PresencePublishMessage),
    SurveyJoin(SurveyTabMessage),
    SurveyLeave(SurveyTabMessage),
    SurveySubmit(SurveySubmitMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthResultMessage {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OnlineCountMessage {
    pub count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberLeftMessage {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub room_name: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocSnapshotMessage {
    pub document_name: String,
    #[serde_as(as = "Base64")]
    pub state: Vec<u8>,
}

/// One presence record as peers see it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub fields: PresenceFields,
    /// Server receive time in epoch milliseconds; later wins.
    pub last_seen: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresenceDiffMessage {
    pub document_name: String,
    pub states: BTreeMap<String, PresenceState>,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurveyStats {
    pub answering: usize,
    pub answered: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SurveySubmitResultMessage {
    pub success: bool,
    pub stats: SurveyStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SurveyReadyMessage {
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthResult(AuthResultMessage),
    OnlineCount(OnlineCountMessage),
    MemberLeft(MemberLeftMessage),
    DocSnapshot(DocSnapshotMessage),
    DocUpdate(DocUpdateMessage),
    #[serde(rename = "presence_publish")]
    PresenceDiff(PresenceDiffMessage),
    SurveyStats(SurveyStats),
    SurveySubmitResult(SurveySubmitResultMessage),
    SurveyReady(SurveyReadyMessage),
    ResetNotification,
    Error(ErrorMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_and_payload_messages() {
        let activity: ClientMessage = serde_json::from_str(r#"{"type":"activity"}"#).unwrap();
        assert!(matches!(activity, ClientMessage::Activity));

        let update: ClientMessage =
            serde_json::from_str(r#"{"type":"doc_update","documentName":"main","fragment":"AQID"}"#).unwrap();
        match update {
            ClientMessage::DocUpdate(m) => {
                assert_eq!(m.document_name, "main");
                assert_eq!(m.fragment, vec![1, 2, 3]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed = serde_json::from_str::<ClientMessage>(r#"{"type":"cursor_moved","x":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_auth_result_omits_missing_fields() {
        let msg = ServerMessage::AuthResult(AuthResultMessage {
            success: false,
            message: Some("nope".to_string()),
            ..Default::default()
        });
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "auth_result");
        assert_eq!(json["success"], false);
        assert!(json.get("roomName").is_none());
    }

    #[test]
    fn test_presence_diff_uses_publish_event_name() {
        let msg = ServerMessage::PresenceDiff(PresenceDiffMessage {
            document_name: "main".to_string(),
            ..Default::default()
        });
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "presence_publish");
        assert_eq!(json["documentName"], "main");
    }
}
