//! HTTP ingress for the document-intake pipeline.
//!
//! Upload persists bytes and returns quickly; workflow start stays decoupled
//! behind the upload-event channel, the way an object-created notification
//! would drive it in a deployed system. Reviewer decisions are delivered as
//! signals to the running workflow.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use docflow_core::io::BlobStore;
use docflow_core::store::DocumentStore;
use docflow_core::types::{
    DocType, DocumentId, DocumentStatus, ReviewDecision, ReviewDecisionSignal,
};
use docflow_engine::{IntakeRuntime, SignalError, WorkflowInput};
use docflow_events::{EventPublisher, InProcessEventSource, UploadEvent, UploadEventSource};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub blob: Arc<dyn BlobStore>,
    pub runtime: Arc<IntakeRuntime>,
    pub events: EventPublisher,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    UnsupportedMedia,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "invalid_argument", message),
            ApiError::UnsupportedMedia => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media",
                "multipart/form-data is required".to_string(),
            ),
            ApiError::Internal(message) => {
                error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        };
        (
            status,
            Json(ErrorBody {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<docflow_core::store::StoreError> for ApiError {
    fn from(err: docflow_core::store::StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<docflow_core::io::BlobError> for ApiError {
    fn from(err: docflow_core::io::BlobError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

pub fn router(state: AppState) -> Router {
    // multipart framing adds overhead on top of the configured file cap
    let body_limit = usize::try_from(state.max_upload_bytes.saturating_add(64 * 1024))
        .unwrap_or(usize::MAX);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/documents", post(upload_document))
        .route("/v1/documents/{document_id}/status", get(get_status))
        .route("/v1/documents/{document_id}/result", get(get_result))
        .route("/v1/documents/{document_id}/review", post(submit_review))
        .route("/v1/reviews/pending", get(pending_reviews))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn readyz(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))).into_response(),
        Err(err) => {
            warn!(error = %err, "readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "not_ready"})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    document_id: DocumentId,
    workflow_id: String,
    status: DocumentStatus,
}

async fn upload_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::UnsupportedMedia)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart payload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|f| f.to_string())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::BadRequest("file field requires a filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, content) =
        upload.ok_or_else(|| ApiError::BadRequest("file form field is required".to_string()))?;
    if content.len() as u64 > state.max_upload_bytes {
        return Err(ApiError::BadRequest("file exceeds size limit".to_string()));
    }

    let document_id = DocumentId::generate();
    state.store.create_received(&document_id, &filename).await?;
    let object_key = state
        .blob
        .put_document(&document_id, &filename, &content)
        .await?;
    state.store.set_object_key(&document_id, &object_key).await?;

    state
        .events
        .publish(UploadEvent {
            document_id: document_id.clone(),
            filename,
            object_key: object_key.clone(),
        })
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(document_id = %document_id, object_key = %object_key, "upload accepted");

    let workflow_id = state.runtime.workflow_id(&document_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id,
            workflow_id,
            status: DocumentStatus::Received,
        }),
    ))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    document_id: DocumentId,
    status: DocumentStatus,
    doc_type: DocType,
}

async fn get_status(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let document_id = DocumentId::new(document_id);
    let (status, doc_type) = state
        .store
        .document_status(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("document not found".to_string()))?;
    Ok(Json(StatusResponse {
        document_id,
        status,
        doc_type,
    }))
}

#[derive(Debug, Serialize)]
struct ResultResponse {
    document_id: DocumentId,
    status: DocumentStatus,
    doc_type: DocType,
    confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected_reason: Option<String>,
}

async fn get_result(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let document_id = DocumentId::new(document_id);
    let record = state
        .store
        .get_document(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("document not found".to_string()))?;

    let payload = record.final_json.as_ref().or(record.current_json.as_ref());
    let result = payload.and_then(|bytes| serde_json::from_slice(bytes).ok());

    Ok(Json(ResultResponse {
        document_id,
        status: record.status,
        doc_type: record.doc_type,
        confidence: record.confidence,
        result,
        rejected_reason: record.rejected_reason,
    }))
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    decision: String,
    #[serde(default)]
    corrections: Option<serde_json::Value>,
    #[serde(default)]
    reviewer: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

async fn submit_review(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let document_id = DocumentId::new(document_id);
    let decision: ReviewDecision = request
        .decision
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid decision".to_string()))?;

    let signal = ReviewDecisionSignal {
        decision,
        corrections: request.corrections.map(|v| v.to_string()),
        reviewer: request.reviewer,
        reason: request.reason,
    };
    state
        .runtime
        .signal_review(&document_id, signal)
        .map_err(|err| match err {
            SignalError::NotRegistered { .. } => {
                ApiError::NotFound("no running workflow for document".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "document_id": document_id,
            "status": "review_signal_sent",
        })),
    ))
}

#[derive(Debug, Serialize)]
struct PendingReviewItem {
    document_id: DocumentId,
    failed_rules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_json: Option<serde_json::Value>,
    status: String,
}

async fn pending_reviews(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items: Vec<PendingReviewItem> = state
        .store
        .list_pending_reviews()
        .await?
        .into_iter()
        .map(|item| PendingReviewItem {
            document_id: item.document_id,
            failed_rules: item.failed_rules,
            current_json: serde_json::from_slice(&item.current_json).ok(),
            status: item.status.as_str().to_string(),
        })
        .collect();
    Ok(Json(serde_json::json!({ "items": items })))
}

/// Consume upload events, fetch the object, and start the workflow. Runs
/// until the event source closes.
pub async fn run_event_pump(
    mut source: InProcessEventSource,
    blob: Arc<dyn BlobStore>,
    runtime: Arc<IntakeRuntime>,
) {
    while let Some(event) = source.recv().await {
        match blob.get_document(&event.object_key).await {
            Ok(content) => {
                let outcome = runtime
                    .start(WorkflowInput {
                        document_id: event.document_id.clone(),
                        filename: event.filename.clone(),
                        content,
                    })
                    .await;
                info!(
                    workflow_id = outcome.workflow_id(),
                    object_key = %event.object_key,
                    "upload event handled"
                );
            }
            Err(err) => {
                error!(
                    object_key = %event.object_key,
                    error = %err,
                    "failed to fetch uploaded object"
                );
            }
        }
    }
    info!("event pump stopped");
}
