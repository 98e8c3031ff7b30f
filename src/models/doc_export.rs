use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Read-only view of the server replica of a document
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentExportResponse {
    pub name: String,
    pub json: serde_json::value::Value,
    pub version_v: serde_json::value::Value,
}
