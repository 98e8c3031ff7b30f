use std::collections::HashSet;
use tracing::debug;

use crate::models::PresencePublishMessage;
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Handle PresencePublishMessage - merge into the document's presence table and
/// forward the diff
pub async fn handle_presence_publish(publish_msg: PresencePublishMessage, ctx: &ConnCtx, state: &AppState) {
    let removed: HashSet<String> = publish_msg.removed.into_iter().collect();
    let diff = state
        .presence
        .publish(ctx.id, &publish_msg.document_name, publish_msg.states, removed)
        .await;

    if !diff.is_empty() {
        debug!(
            "Presence on '{}' from {}: +{} ~{} -{}",
            publish_msg.document_name,
            ctx.id,
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len()
        );
    }
}
