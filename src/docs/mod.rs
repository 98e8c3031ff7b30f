use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Broadcast a reset notification to every connection
#[utoipa::path(
    post,
    path = "/api/reset",
    responses(
        (status = 200, description = "Notification sent", body = ResetResponse)
    )
)]
#[allow(dead_code)]
pub async fn reset_doc() {}

/// Document channel URL for browsers
#[utoipa::path(
    get,
    path = "/api/websocket-info",
    responses(
        (status = 200, description = "Where to connect", body = WebsocketInfoResponse),
        (status = 400, description = "No Host header and no PUBLIC_WS_URL", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn websocket_info_doc() {}

/// Relay and host statistics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current statistics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Export the server replica of a document
#[utoipa::path(
    get,
    path = "/api/v1/documents/{document_name}/export",
    params(
        ("document_name" = String, Path, description = "Document name")
    ),
    responses(
        (status = 200, description = "Document content", body = DocumentExportResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_export_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        reset_doc,
        websocket_info_doc,
        diagnostics_doc,
        doc_export_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ResetResponse,
            WebsocketInfoResponse,
            DiagnosticsResponse,
            DocumentExportResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
