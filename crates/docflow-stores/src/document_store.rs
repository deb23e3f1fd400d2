//! DocumentStore in-memory implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use docflow_core::store::{DocumentStore, StoreError};
use docflow_core::types::{
    AttemptPhase, AuditEntry, AuditState, DocType, DocumentId, DocumentRecord, DocumentStatus,
    ExtractionAttempt, ReviewQueueItem, ReviewQueueStatus,
};

#[derive(Default)]
struct State {
    documents: HashMap<String, DocumentRecord>,
    attempts: Vec<ExtractionAttempt>,
    audit: Vec<AuditEntry>,
    reviews: HashMap<String, ReviewQueueItem>,
    // first-queued order, so pending listings are stable
    review_order: Vec<String>,
}

/// In-memory implementation for development and testing.
///
/// A single lock guards all tables, which gives `queue_review` its
/// transactional guarantee for free.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<State>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    /// Audit states for a document, in commit order.
    pub fn audit_states(&self, document_id: &DocumentId) -> Vec<AuditState> {
        self.read()
            .map(|state| {
                state
                    .audit
                    .iter()
                    .filter(|e| e.document_id == *document_id)
                    .map(|e| e.state)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Full audit entries for a document, in commit order.
    pub fn audit_entries(&self, document_id: &DocumentId) -> Vec<AuditEntry> {
        self.read()
            .map(|state| {
                state
                    .audit
                    .iter()
                    .filter(|e| e.document_id == *document_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Extraction attempt phases for a document, in insertion order.
    pub fn attempt_phases(&self, document_id: &DocumentId) -> Vec<AttemptPhase> {
        self.read()
            .map(|state| {
                state
                    .attempts
                    .iter()
                    .filter(|a| a.document_id == *document_id)
                    .map(|a| a.phase)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn review_item(&self, document_id: &DocumentId) -> Option<ReviewQueueItem> {
        self.read()
            .ok()
            .and_then(|state| state.reviews.get(document_id.as_str()).cloned())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_received(
        &self,
        document_id: &DocumentId,
        filename: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state
            .documents
            .entry(document_id.as_str().to_string())
            .or_insert_with(|| DocumentRecord::received(document_id.clone(), filename));
        Ok(())
    }

    async fn set_object_key(
        &self,
        document_id: &DocumentId,
        object_key: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(record) = state.documents.get_mut(document_id.as_str()) {
            record.object_key = object_key.to_string();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_document(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        match state.documents.get_mut(record.id.as_str()) {
            Some(existing) => {
                existing.filename = record.filename;
                if existing.object_key.is_empty() {
                    existing.object_key = record.object_key;
                }
                if existing.raw_text.is_empty() {
                    existing.raw_text = record.raw_text;
                }
                if existing.doc_type == DocType::Unknown {
                    existing.doc_type = record.doc_type;
                }
                existing.status = record.status;
                existing.updated_at = Utc::now();
            }
            None => {
                state
                    .documents
                    .insert(record.id.as_str().to_string(), record);
            }
        }
        Ok(())
    }

    async fn get_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.read()?.documents.get(document_id.as_str()).cloned())
    }

    async fn update_classification(
        &self,
        document_id: &DocumentId,
        doc_type: DocType,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(record) = state.documents.get_mut(document_id.as_str()) {
            record.doc_type = doc_type;
            record.status = DocumentStatus::Classified;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_audit(
        &self,
        document_id: &DocumentId,
        state: AuditState,
        detail: Value,
    ) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        guard.audit.push(AuditEntry {
            document_id: document_id.clone(),
            state,
            detail,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn save_model_output(
        &self,
        document_id: &DocumentId,
        phase: AttemptPhase,
        output: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.attempts.push(ExtractionAttempt {
            document_id: document_id.clone(),
            phase,
            output: output.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn save_current_extraction(
        &self,
        document_id: &DocumentId,
        payload: &[u8],
        confidence: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(record) = state.documents.get_mut(document_id.as_str()) {
            record.current_json = Some(payload.to_vec());
            record.confidence = confidence;
            record.status = DocumentStatus::Extracted;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn current_extraction(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError> {
        let state = self.read()?;
        Ok(state.documents.get(document_id.as_str()).and_then(|rec| {
            rec.current_json
                .as_ref()
                .filter(|p| !p.is_empty())
                .map(|p| (p.clone(), rec.confidence))
        }))
    }

    async fn queue_review(
        &self,
        document_id: &DocumentId,
        failed_rules: &[String],
        current_json: &[u8],
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let key = document_id.as_str().to_string();
        if !state.reviews.contains_key(&key) {
            state.review_order.push(key.clone());
        }
        state.reviews.insert(
            key,
            ReviewQueueItem {
                document_id: document_id.clone(),
                failed_rules: failed_rules.to_vec(),
                current_json: current_json.to_vec(),
                status: ReviewQueueStatus::Pending,
            },
        );
        if let Some(record) = state.documents.get_mut(document_id.as_str()) {
            record.status = DocumentStatus::NeedsReview;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn resolve_review(
        &self,
        document_id: &DocumentId,
        decision: ReviewQueueStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(item) = state.reviews.get_mut(document_id.as_str()) {
            item.status = decision;
        }
        Ok(())
    }

    async fn save_final_result(
        &self,
        document_id: &DocumentId,
        payload: Option<&[u8]>,
        confidence: f64,
        status: DocumentStatus,
        rejected_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(record) = state.documents.get_mut(document_id.as_str()) {
            if let Some(payload) = payload {
                record.final_json = Some(payload.to_vec());
            }
            record.confidence = confidence;
            record.status = status;
            record.rejected_reason = rejected_reason.map(|r| r.to_string());
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn document_status(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<(DocumentStatus, DocType)>, StoreError> {
        Ok(self
            .read()?
            .documents
            .get(document_id.as_str())
            .map(|rec| (rec.status, rec.doc_type)))
    }

    async fn list_pending_reviews(&self) -> Result<Vec<ReviewQueueItem>, StoreError> {
        let state = self.read()?;
        Ok(state
            .review_order
            .iter()
            .filter_map(|id| state.reviews.get(id))
            .filter(|item| item.status == ReviewQueueStatus::Pending)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_record(id: &DocumentId) -> DocumentRecord {
        let mut record = DocumentRecord::received(id.clone(), "doc.txt");
        record.object_key = format!("{}/doc.txt", id);
        record.raw_text = "Invoice total amount 100".to_string();
        record.doc_type = DocType::Unknown;
        record.status = DocumentStatus::Stored;
        record
    }

    #[test]
    fn test_upsert_preserves_populated_fields() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            let id = DocumentId::generate();
            store.upsert_document(stored_record(&id)).await.unwrap();
            store
                .update_classification(&id, DocType::Invoice)
                .await
                .unwrap();

            // a replayed upsert carries empty fields and the unknown doc type
            let mut replay = DocumentRecord::received(id.clone(), "doc.txt");
            replay.status = DocumentStatus::Stored;
            store.upsert_document(replay).await.unwrap();

            let record = store.get_document(&id).await.unwrap().unwrap();
            assert_eq!(record.object_key, format!("{}/doc.txt", id));
            assert_eq!(record.raw_text, "Invoice total amount 100");
            assert_eq!(record.doc_type, DocType::Invoice);
            assert_eq!(record.status, DocumentStatus::Stored);
        });
    }

    #[test]
    fn test_create_received_is_idempotent() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            let id = DocumentId::generate();
            store.create_received(&id, "a.txt").await.unwrap();
            store.set_object_key(&id, "key").await.unwrap();
            store.create_received(&id, "b.txt").await.unwrap();

            let record = store.get_document(&id).await.unwrap().unwrap();
            assert_eq!(record.filename, "a.txt");
            assert_eq!(record.object_key, "key");
        });
    }

    #[test]
    fn test_queue_review_updates_item_and_document_together() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            let id = DocumentId::generate();
            store.upsert_document(stored_record(&id)).await.unwrap();
            store
                .queue_review(&id, &["invoice.total_amount_gt_zero".to_string()], b"{}")
                .await
                .unwrap();

            let (status, _) = store.document_status(&id).await.unwrap().unwrap();
            assert_eq!(status, DocumentStatus::NeedsReview);
            let item = store.review_item(&id).unwrap();
            assert_eq!(item.status, ReviewQueueStatus::Pending);
        });
    }

    #[test]
    fn test_pending_reviews_ordered_and_filtered() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            let first = DocumentId::generate();
            let second = DocumentId::generate();
            store.upsert_document(stored_record(&first)).await.unwrap();
            store.upsert_document(stored_record(&second)).await.unwrap();

            store.queue_review(&first, &[], b"{}").await.unwrap();
            store.queue_review(&second, &[], b"{}").await.unwrap();
            store
                .resolve_review(&first, ReviewQueueStatus::Completed)
                .await
                .unwrap();

            let pending = store.list_pending_reviews().await.unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].document_id, second);
        });
    }

    #[test]
    fn test_save_final_result_keeps_final_json_when_absent() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            let id = DocumentId::generate();
            store.upsert_document(stored_record(&id)).await.unwrap();
            store
                .save_final_result(&id, Some(b"{\"ok\":true}"), 0.9, DocumentStatus::Completed, None)
                .await
                .unwrap();
            store
                .save_final_result(&id, None, 0.0, DocumentStatus::Rejected, Some("dup"))
                .await
                .unwrap();

            let record = store.get_document(&id).await.unwrap().unwrap();
            assert_eq!(record.final_json.as_deref(), Some(&b"{\"ok\":true}"[..]));
            assert_eq!(record.rejected_reason.as_deref(), Some("dup"));
        });
    }

    #[test]
    fn test_attempts_keep_insertion_order() {
        tokio_test::block_on(async {
            let store = InMemoryDocumentStore::new();
            let id = DocumentId::generate();
            store
                .save_model_output(&id, AttemptPhase::BaseAttempt1, "{bad")
                .await
                .unwrap();
            store
                .save_model_output(&id, AttemptPhase::RepairAttempt1, "{}")
                .await
                .unwrap();
            assert_eq!(
                store.attempt_phases(&id),
                vec![AttemptPhase::BaseAttempt1, AttemptPhase::RepairAttempt1]
            );
        });
    }
}
