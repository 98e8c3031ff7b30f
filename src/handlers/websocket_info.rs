use crate::{config::Config, models::{ErrorResponse, WebsocketInfoResponse}, state::AppState};
use axum::{
    extract::State,
    http::{header::HOST, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

/// Derive the document channel URL a browser should connect to.
///
/// An explicit `PUBLIC_WS_URL` wins. Otherwise the request's `Host` is used, with
/// `wss` when a proxy reports `X-Forwarded-Proto: https`.
pub fn compute_websocket_url(config: &Config, host: Option<&str>, forwarded_proto: Option<&str>) -> Option<String> {
    if let Some(url) = config.public_ws_url.as_ref().filter(|u| !u.trim().is_empty()) {
        return Some(url.clone());
    }
    let host = host.filter(|h| !h.is_empty())?;
    let scheme = match forwarded_proto {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "wss",
        _ => "ws",
    };
    Some(format!("{}://{}/yjs", scheme, host))
}

pub async fn websocket_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<WebsocketInfoResponse>, (StatusCode, Json<ErrorResponse>)> {
    let host = headers.get(HOST).and_then(|h| h.to_str().ok());
    let proto = headers.get("x-forwarded-proto").and_then(|h| h.to_str().ok());

    let websocket_url = compute_websocket_url(&state.config, host, proto)
        .ok_or_else(|| ErrorResponse::reply(StatusCode::BAD_REQUEST, "Missing Host header"))?;

    Ok(Json(WebsocketInfoResponse {
        websocket_url,
        environment: state.config.environment.clone(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
