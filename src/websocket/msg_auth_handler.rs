use tracing::debug;

use crate::models::{AuthMessage, AuthResultMessage, ServerMessage};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Handle AuthMessage - the display-name handshake, acked on the same connection
pub async fn handle_auth_message(auth_msg: &AuthMessage, ctx: &ConnCtx, state: &AppState) {
    let result = match state.sessions.authorize(ctx.id, &auth_msg.display_name).await {
        Ok(session) => AuthResultMessage {
            success: true,
            room_name: Some(session.room_name),
            display_name: Some(session.display_name),
            message: Some("Authorized".to_string()),
        },
        Err(e) => {
            debug!("Auth rejected for connection {}: {}", ctx.id, e);
            AuthResultMessage {
                success: false,
                message: Some(e.to_string()),
                ..Default::default()
            }
        }
    };

    state.peers.send_to(ctx.id, ServerMessage::AuthResult(result)).await;
}
