use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where clients should open the document channel
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketInfoResponse {
    pub websocket_url: String,
    pub environment: String,
    pub timestamp: String,
}
