use tracing::{error, info};

use crate::models::{DocSnapshotMessage, ErrorMessage, ServerMessage};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Handle a document join - bind the connection, then hand over the full state and
/// the presence records already known for that document
pub async fn handle_doc_join(document_name: &str, ctx: &ConnCtx, state: &AppState) {
    if document_name.trim().is_empty() {
        let msg = ErrorMessage {
            message: "Document name cannot be empty".to_string(),
        };
        state.peers.send_to(ctx.id, ServerMessage::Error(msg)).await;
        return;
    }

    info!("Connection {} joining document '{}'", ctx.id, document_name);

    match state.docs.join(ctx.id, document_name).await {
        Ok(snapshot) => {
            let msg = ServerMessage::DocSnapshot(DocSnapshotMessage {
                document_name: document_name.to_string(),
                state: snapshot,
            });
            state.peers.send_to(ctx.id, msg).await;
        }
        Err(e) => {
            error!("Failed to export document '{}' for {}: {}", document_name, ctx.id, e);
            let msg = ErrorMessage {
                message: format!("Document '{}' is unavailable", document_name),
            };
            state.peers.send_to(ctx.id, ServerMessage::Error(msg)).await;
            return;
        }
    }

    if let Some(initial) = state.presence.bind(ctx.id, document_name).await {
        state.peers.send_to(ctx.id, initial).await;
    }
}
