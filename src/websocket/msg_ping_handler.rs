use tracing::trace;

use crate::ws::connctx::ConnCtx;

/// Handle `activity` / `presence_ping`. The watchdog was already touched when the
/// frame arrived, so there is nothing to reply.
pub fn handle_activity_message(ctx: &ConnCtx) {
    trace!("Activity from connection {}", ctx.id);
}
