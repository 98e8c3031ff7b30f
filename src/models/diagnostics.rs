use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_conn: u32,
    pub n_event_conn: u32,
    pub n_doc_conn: u32,
    pub n_sessions: u32,
    pub n_docs: u32,
    pub n_doc_subscribers: u32,
    pub n_presence_records: u32,
    pub survey_answering: u32,
    pub survey_answered: u32,
    pub survey_ready: bool,
    pub uptime_secs: i64,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
