use crate::{models::{ResetResponse, ServerMessage}, state::AppState};
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

/// Tell every connected client to reset its local state
pub async fn reset(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    let notified = state.peers.len().await as u32;
    state.peers.broadcast_all(&ServerMessage::ResetNotification).await;
    info!("Reset notification sent to {} connection(s)", notified);

    Json(ResetResponse {
        success: true,
        message: "Reset notification sent".to_string(),
        notified,
    })
}
