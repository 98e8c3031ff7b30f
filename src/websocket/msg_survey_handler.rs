use tracing::debug;

use crate::error::SurveyError;
use crate::models::{ServerMessage, SurveySubmitMessage, SurveySubmitResultMessage, SurveyTabMessage};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

pub async fn handle_survey_join(join_msg: &SurveyTabMessage, ctx: &ConnCtx, state: &AppState) {
    let user_id = match join_msg.client_tab_id.trim() {
        "" => fallback_user_id(ctx, state).await,
        id => id.to_string(),
    };
    state.survey.join(ctx.id, &user_id).await;
}

/// Leave is per connection: the tab stops answering under the identity it joined with,
/// whatever `clientTabId` the payload names.
pub async fn handle_survey_leave(leave_msg: &SurveyTabMessage, ctx: &ConnCtx, state: &AppState) {
    let named = leave_msg.client_tab_id.trim();
    if !named.is_empty() {
        if let Some(bound) = state.survey.user_of(ctx.id).await.filter(|bound| bound.as_str() != named) {
            debug!("Survey leave from {} names '{}' but the tab joined as '{}'", ctx.id, named, bound);
        }
    }
    state.survey.leave(ctx.id).await;
}

/// Handle SurveySubmitMessage. A repeated submission is acked as a success without
/// being counted again.
pub async fn handle_survey_submit(submit_msg: SurveySubmitMessage, ctx: &ConnCtx, state: &AppState) {
    let fallback = fallback_user_id(ctx, state).await;
    let stats = match state.survey.submit(ctx.id, &fallback, submit_msg.tags).await {
        Ok(stats) => stats,
        Err(SurveyError::AlreadySubmitted) => {
            debug!("Repeated survey submission from {}", ctx.id);
            state.survey.stats().await
        }
    };

    let ack = ServerMessage::SurveySubmitResult(SurveySubmitResultMessage { success: true, stats });
    state.peers.send_to(ctx.id, ack).await;
}

async fn fallback_user_id(ctx: &ConnCtx, state: &AppState) -> String {
    match state.sessions.session(ctx.id).await {
        Some(session) => session.display_name,
        None => ctx.id.to_string(),
    }
}
