//! Persistence capability traits.
//!
//! Trait definitions only; implementations live in `docflow-stores`
//! (in-memory) and `docflow-stores-backends` (Postgres). Activities are the
//! only callers that mutate state through these traits.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    AttemptPhase, AuditState, DocType, DocumentId, DocumentRecord, DocumentStatus,
    ReviewQueueItem, ReviewQueueStatus,
};

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// The relational document store.
///
/// Writes follow conditional-upsert semantics: fields already holding
/// non-empty values are preserved unless they are the explicit target of the
/// transition. `queue_review` updates the review queue and the document status
/// atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Ingress insert; a no-op when the row already exists.
    async fn create_received(
        &self,
        document_id: &DocumentId,
        filename: &str,
    ) -> Result<(), StoreError>;

    /// Ingress update once the upload landed in the object store.
    async fn set_object_key(
        &self,
        document_id: &DocumentId,
        object_key: &str,
    ) -> Result<(), StoreError>;

    async fn upsert_document(&self, record: DocumentRecord) -> Result<(), StoreError>;

    async fn get_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    async fn update_classification(
        &self,
        document_id: &DocumentId,
        doc_type: DocType,
    ) -> Result<(), StoreError>;

    async fn insert_audit(
        &self,
        document_id: &DocumentId,
        state: AuditState,
        detail: Value,
    ) -> Result<(), StoreError>;

    /// Append one raw model output under its phase tag. Never mutated.
    async fn save_model_output(
        &self,
        document_id: &DocumentId,
        phase: AttemptPhase,
        output: &str,
    ) -> Result<(), StoreError>;

    async fn save_current_extraction(
        &self,
        document_id: &DocumentId,
        payload: &[u8],
        confidence: f64,
    ) -> Result<(), StoreError>;

    async fn current_extraction(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError>;

    /// Upsert the review item as PENDING and set the document status to
    /// NEEDS_REVIEW in a single transaction.
    async fn queue_review(
        &self,
        document_id: &DocumentId,
        failed_rules: &[String],
        current_json: &[u8],
    ) -> Result<(), StoreError>;

    /// Last-writer-wins status update on the review item.
    async fn resolve_review(
        &self,
        document_id: &DocumentId,
        decision: ReviewQueueStatus,
    ) -> Result<(), StoreError>;

    async fn save_final_result(
        &self,
        document_id: &DocumentId,
        payload: Option<&[u8]>,
        confidence: f64,
        status: DocumentStatus,
        rejected_reason: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn document_status(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<(DocumentStatus, DocType)>, StoreError>;

    async fn list_pending_reviews(&self) -> Result<Vec<ReviewQueueItem>, StoreError>;

    /// Liveness probe used by the readiness endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
