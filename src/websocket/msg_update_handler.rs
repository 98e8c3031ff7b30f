use tracing::debug;

use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Handle a document update fragment - merge, then forward to the other peers.
/// Rejected fragments are logged by the relay and dropped here.
pub async fn handle_doc_update(document_name: &str, fragment: Vec<u8>, ctx: &ConnCtx, state: &AppState) {
    let size = fragment.len();
    if let Ok(forwarded) = state.docs.apply_and_broadcast(ctx.id, document_name, fragment).await {
        debug!(
            "Update of {} bytes from {} on '{}' forwarded to {} peer(s)",
            size, ctx.id, document_name, forwarded
        );
    }
}
