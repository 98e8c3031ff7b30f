use crate::{
    handlers::{diagnostics, doc_export, health_check, ready_check, reset, websocket_info},
    state::AppState,
};
use axum::{routing::{get, post}, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/reset", post(reset))
        .route("/websocket-info", get(websocket_info))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/documents/:document_name/export", get(doc_export))
}
