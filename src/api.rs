//! HTTP surface for the knowledge base.
//!
//! - `POST /documents` – Upload raw file bytes; metadata travels in the query string
//!   (`file_name`, `department_id`, optional `chat_type`, `user`, `chat_thread_id`, `uploaded_by`).
//!   Returns `202` with the new document id while processing continues in the background.
//! - `GET /documents/:id` / `DELETE /documents/:id` – Inspect or soft-delete a document.
//! - `POST /documents/repair` – Re-run every `blank`/`error` document in the background.
//! - `GET /threads/:id/citations` – Citations for a thread's latest answer, with diagnostics.
//! - `POST /index/ensure` / `POST /index/recreate` – Index administration; recreation requires
//!   `{"confirm": true}`.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable command catalog.

use crate::documents::Document;
use crate::index::ChatType;
use crate::pipeline::{IngestRequest, KnowledgeBaseApi, PipelineError, SYSTEM_UPLOADER};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router; uploads larger than `body_limit` bytes are rejected with `413`.
pub fn create_router<S>(service: Arc<S>, body_limit: usize) -> Router
where
    S: KnowledgeBaseApi + 'static,
{
    Router::new()
        .route("/documents", post(upload_document::<S>))
        .route("/documents/repair", post(repair_documents::<S>))
        .route(
            "/documents/:id",
            get(get_document::<S>).delete(delete_document::<S>),
        )
        .route("/threads/:id/citations", get(get_citations::<S>))
        .route("/index/ensure", post(ensure_index::<S>))
        .route("/index/recreate", post(recreate_index::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Query parameters of `POST /documents`.
#[derive(Debug, Deserialize)]
struct UploadParams {
    file_name: String,
    department_id: String,
    #[serde(default)]
    chat_type: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    chat_thread_id: Option<String>,
    #[serde(default)]
    uploaded_by: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    document_id: String,
    status: &'static str,
}

async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError>
where
    S: KnowledgeBaseApi,
{
    let chat_type = match params.chat_type.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw.parse::<ChatType>().map_err(AppError::BadRequest)?,
        _ => ChatType::Doc,
    };
    let uploaded_by = params
        .uploaded_by
        .or_else(|| params.user.clone())
        .unwrap_or_else(|| SYSTEM_UPLOADER.to_string());
    let request = IngestRequest {
        bytes: body.to_vec(),
        file_name: params.file_name,
        department_id: params.department_id,
        chat_type,
        user: params.user,
        chat_thread_id: params.chat_thread_id,
        uploaded_by,
    };
    let file_name = request.file_name.clone();
    let size = request.bytes.len();

    let document_id = service.ingest_with(request).await?;
    tracing::info!(document_id = %document_id, file_name = %file_name, size, "Upload accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id,
            status: "uploaded",
        }),
    ))
}

async fn get_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError>
where
    S: KnowledgeBaseApi,
{
    Ok(Json(service.document(&id).await?))
}

async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError>
where
    S: KnowledgeBaseApi,
{
    Ok(Json(service.delete_document(&id).await?))
}

async fn repair_documents<S>(State(service): State<Arc<S>>) -> (StatusCode, Json<serde_json::Value>)
where
    S: KnowledgeBaseApi,
{
    service.spawn_repair();
    (StatusCode::ACCEPTED, Json(json!({ "status": "repair started" })))
}

async fn get_citations<S>(
    State(service): State<Arc<S>>,
    Path(thread_id): Path<String>,
) -> Json<crate::citations::CitationResolution>
where
    S: KnowledgeBaseApi,
{
    Json(service.resolve(&thread_id).await)
}

async fn ensure_index<S>(State(service): State<Arc<S>>) -> Result<Json<serde_json::Value>, AppError>
where
    S: KnowledgeBaseApi,
{
    service.ensure_index_created().await?;
    Ok(Json(json!({ "status": "ready" })))
}

#[derive(Debug, Default, Deserialize)]
struct RecreateRequest {
    #[serde(default)]
    confirm: bool,
}

async fn recreate_index<S>(
    State(service): State<Arc<S>>,
    request: Option<Json<RecreateRequest>>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: KnowledgeBaseApi,
{
    let confirmed = request.is_some_and(|Json(body)| body.confirm);
    if !confirmed {
        return Err(AppError::BadRequest(
            "index recreation drops every chunk; send {\"confirm\": true} to proceed".into(),
        ));
    }
    service.force_recreate_index().await?;
    Ok(Json(json!({ "status": "recreated" })))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: KnowledgeBaseApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/documents?file_name=<name>&department_id=<id>",
                description: "Upload raw file bytes for extraction, chunking, and indexing. Returns 202 with { \"document_id\": string, \"status\": \"uploaded\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "get_document",
                method: "GET",
                path: "/documents/:id",
                description: "Return the tracked record, including status, pages, confidence, and error reason.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_document",
                method: "DELETE",
                path: "/documents/:id",
                description: "Soft-delete a document and remove its chunks from the index.",
                request_example: None,
            },
            CommandDescriptor {
                name: "repair_documents",
                method: "POST",
                path: "/documents/repair",
                description: "Re-process every blank or error document in the background.",
                request_example: None,
            },
            CommandDescriptor {
                name: "thread_citations",
                method: "GET",
                path: "/threads/:id/citations",
                description: "Resolve citations for the latest answer: saved ones first, then a scoped search.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ensure_index",
                method: "POST",
                path: "/index/ensure",
                description: "Create the vector index and its filterable fields when missing.",
                request_example: None,
            },
            CommandDescriptor {
                name: "recreate_index",
                method: "POST",
                path: "/index/recreate",
                description: "Drop and rebuild the vector index. Destructive; requires confirmation.",
                request_example: Some(json!({ "confirm": true })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Pipeline(error) => {
                let status = if error.is_input_error() {
                    StatusCode::BAD_REQUEST
                } else if error.is_not_found() {
                    StatusCode::NOT_FOUND
                } else if error.is_index_missing() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    tracing::error!(error = %error, "Request failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}
