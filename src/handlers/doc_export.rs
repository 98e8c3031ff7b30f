use crate::{models::{DocumentExportResponse, ErrorResponse}, state::AppState};
use axum::{extract::{Path, State}, http::StatusCode, Json};
use loro::ToJson;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Export the server replica of a document as JSON
pub async fn doc_export(
    State(state): State<Arc<AppState>>,
    Path(document_name): Path<String>,
) -> Result<(StatusCode, Json<DocumentExportResponse>), (StatusCode, Json<ErrorResponse>)> {
    let exported = state
        .docs
        .with_document(&document_name, |doc| {
            let json = doc.get_deep_value().to_json_value();
            let version_v: Map<String, Value> = doc
                .state_vv()
                .iter()
                .map(|(peer, counter)| (peer.to_string(), Value::from(*counter)))
                .collect();
            (json, Value::Object(version_v))
        })
        .await;

    let Some((json, version_v)) = exported else {
        warn!("Export requested for unknown document '{}'", document_name);
        return Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Document '{}' not found", document_name),
        ));
    };

    Ok((
        StatusCode::OK,
        Json(DocumentExportResponse {
            name: document_name,
            json,
            version_v,
        }),
    ))
}
