use std::sync::Arc;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Path, Query, State},
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{DisconnectReason, TransportError};
use crate::models::{ClientMessage, ErrorMessage, ServerMessage};
use crate::services::session_registry::MAIN_ROOM;
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::{
    msg_auth_handler::handle_auth_message,
    msg_load_handler::handle_doc_join,
    msg_ping_handler::handle_activity_message,
    msg_presence_handler::handle_presence_publish,
    msg_survey_handler::{handle_survey_join, handle_survey_leave, handle_survey_submit},
    msg_update_handler::handle_doc_update,
};
use crate::ws::connctx::{ChannelKind, ConnCtx, ConnectionId};

/// Largest inbound frame accepted on either channel
const MAX_MESSAGE_SIZE: usize = 1_000_000;

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub doc: Option<String>,
}

/// Event channel: sessions, survey and JSON-framed document traffic
pub async fn events_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New event channel connection attempt");
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, ConnCtx::events(), state))
}

/// Document channel bound to the document named in the path
pub async fn document_ws_handler(
    Path(document_name): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("New document channel connection attempt for '{}'", document_name);
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, ConnCtx::document(document_name), state))
}

/// Document channel bound to `?doc=`, or to the main document
pub async fn document_query_ws_handler(
    Query(query): Query<DocumentQuery>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let document_name = query
        .doc
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| MAIN_ROOM.to_string());
    document_ws_handler(Path(document_name), ws, State(state)).await
}

/// Drive one connection from upgrade to teardown
async fn handle_socket(socket: WebSocket, ctx: ConnCtx, state: Arc<AppState>) {
    let conn_id = ctx.id;
    info!("WebSocket connection {} established ({:?} channel)", conn_id, ctx.kind);

    let (sink, mut stream) = socket.split();

    // Everything addressed to this connection funnels through one outbox
    let (outbox, inbox) = mpsc::unbounded_channel::<ServerMessage>();
    state.peers.attach(conn_id, ctx.kind, outbox).await;

    let (expired_tx, mut expired_rx) = oneshot::channel::<()>();
    state
        .sessions
        .register(conn_id, move || {
            let _ = expired_tx.send(());
        })
        .await;

    // Teardown still runs if this task unwinds before the normal path reaches it
    let guard_state = state.clone();
    let guard = ScopeGuard::new(move || {
        tokio::spawn(async move {
            teardown(&guard_state, conn_id, DisconnectReason::HandlerAborted).await;
        });
    });

    let mut send_task = tokio::spawn(write_outbox(sink, inbox, ctx.kind, conn_id));

    if let Some(document_name) = ctx.document.as_deref() {
        handle_doc_join(document_name, &ctx, &state).await;
    }

    let reason = loop {
        tokio::select! {
            expired = &mut expired_rx => {
                break match expired {
                    Ok(()) => DisconnectReason::InactivityTimeout,
                    Err(_) => DisconnectReason::Transport("watchdog dropped".to_string()),
                };
            }
            _ = &mut send_task => {
                break DisconnectReason::Transport("outbound stream closed".to_string());
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.sessions.touch(conn_id).await;
                    handle_text_frame(&text, &ctx, &state).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    state.sessions.touch(conn_id).await;
                    handle_binary_frame(bytes, &ctx, &state).await;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    state.sessions.touch(conn_id).await;
                }
                Some(Ok(Message::Close(_))) | None => break DisconnectReason::ClientClosed,
                Some(Err(e)) => break DisconnectReason::Transport(e.to_string()),
            }
        }
    };

    guard.dismiss();
    send_task.abort();
    drop(stream);

    if reason == DisconnectReason::InactivityTimeout {
        info!("Connection {} idle for {:?}, dropping it", conn_id, state.config.inactivity_window());
    }
    teardown(&state, conn_id, reason).await;
}

/// Release everything a connection holds. Peers are detached first so nothing
/// broadcast during the rest of teardown is addressed to the closing socket.
pub async fn teardown(state: &AppState, conn_id: ConnectionId, reason: DisconnectReason) {
    info!("Connection {} disconnected, reason: {}", conn_id, reason);
    state.peers.detach(conn_id).await;
    if let Some(session) = state.sessions.unregister(conn_id).await {
        debug!("Session of '{}' closed", session.display_name);
    }
    state.docs.leave_all(conn_id).await;
    state.presence.unbind(conn_id).await;
    state.survey.disconnect(conn_id).await;
}

async fn write_outbox(
    mut sink: SplitSink<WebSocket, Message>,
    mut inbox: mpsc::UnboundedReceiver<ServerMessage>,
    kind: ChannelKind,
    conn_id: ConnectionId,
) {
    while let Some(msg) = inbox.recv().await {
        let frame = match encode_frame(kind, msg) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode message for {}: {}", conn_id, e);
                continue;
            }
        };
        if let Err(e) = sink.send(frame).await.map_err(TransportError::from) {
            debug!("Stopped writing to {}: {}", conn_id, e);
            break;
        }
    }
}

/// Document channels carry document bytes as raw binary frames; everything else is JSON text.
fn encode_frame(kind: ChannelKind, msg: ServerMessage) -> Result<Message, TransportError> {
    let frame = match (kind, msg) {
        (ChannelKind::Document, ServerMessage::DocUpdate(update)) => Message::Binary(update.fragment),
        (ChannelKind::Document, ServerMessage::DocSnapshot(snapshot)) => Message::Binary(snapshot.state),
        (_, msg) => Message::Text(serde_json::to_string(&msg)?),
    };
    Ok(frame)
}

async fn handle_text_frame(text: &str, ctx: &ConnCtx, state: &AppState) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Unrecognized frame from {}: {}", ctx.id, e);
            let reply = ErrorMessage {
                message: format!("Unrecognized message: {}", e),
            };
            state.peers.send_to(ctx.id, ServerMessage::Error(reply)).await;
            return;
        }
    };

    match msg {
        ClientMessage::Auth(auth_msg) => handle_auth_message(&auth_msg, ctx, state).await,
        ClientMessage::Activity | ClientMessage::PresencePing => handle_activity_message(ctx),
        ClientMessage::DocJoin(join_msg) => handle_doc_join(&join_msg.document_name, ctx, state).await,
        ClientMessage::DocUpdate(update_msg) => {
            handle_doc_update(&update_msg.document_name, update_msg.fragment, ctx, state).await
        }
        ClientMessage::PresencePublish(publish_msg) => handle_presence_publish(publish_msg, ctx, state).await,
        ClientMessage::SurveyJoin(join_msg) => handle_survey_join(&join_msg, ctx, state).await,
        ClientMessage::SurveyLeave(leave_msg) => handle_survey_leave(&leave_msg, ctx, state).await,
        ClientMessage::SurveySubmit(submit_msg) => handle_survey_submit(submit_msg, ctx, state).await,
    }
}

async fn handle_binary_frame(bytes: Vec<u8>, ctx: &ConnCtx, state: &AppState) {
    match ctx.document.as_deref() {
        Some(document_name) => handle_doc_update(document_name, bytes, ctx, state).await,
        None => {
            warn!("Binary frame of {} bytes on event channel {}", bytes.len(), ctx.id);
            let reply = ErrorMessage {
                message: "Binary frames are only accepted on document channels".to_string(),
            };
            state.peers.send_to(ctx.id, ServerMessage::Error(reply)).await;
        }
    }
}
