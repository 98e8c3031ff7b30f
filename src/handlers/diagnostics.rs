use crate::models::DiagnosticsResponse;
use crate::state::AppState;
use crate::ws::connctx::ChannelKind;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Relay and host statistics
pub async fn diagnostics(State(state): State<Arc<AppState>>) -> (StatusCode, Json<DiagnosticsResponse>) {
    let n_conn = state.peers.len().await as u32;
    let n_event_conn = state.peers.count_by_kind(ChannelKind::Events).await as u32;
    let n_doc_conn = state.peers.count_by_kind(ChannelKind::Document).await as u32;
    let n_sessions = state.sessions.count(crate::services::session_registry::MAIN_ROOM).await as u32;
    let n_docs = state.docs.document_count().await as u32;
    let n_doc_subscribers = state.docs.subscriber_count().await as u32;
    let n_presence_records = state.presence.record_count().await as u32;
    let survey = state.survey.stats().await;
    let survey_ready = state.survey.ready_emitted().await;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Docs: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_docs
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_event_conn,
            n_doc_conn,
            n_sessions,
            n_docs,
            n_doc_subscribers,
            n_presence_records,
            survey_answering: survey.answering as u32,
            survey_answered: survey.answered as u32,
            survey_ready,
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
