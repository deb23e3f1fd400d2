//! The side-effectful activity layer.
//!
//! Activities are the only components that perform I/O. Each one is
//! idempotent by document id: it reads persisted state first and
//! short-circuits when its effect is already present, so the runtime may
//! replay any of them after a crash without duplicating audit rows, object
//! writes, or model spend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docflow_core::io::{BlobError, BlobStore};
use docflow_core::normalizer::{normalize, NormalizeError};
use docflow_core::rules::{self, RuleReport, RULE_REVIEWER_CORRECTIONS_INVALID_JSON};
use docflow_core::store::{DocumentStore, StoreError};
use docflow_core::types::{
    schema_for, AttemptPhase, AuditState, DocType, DocumentId, DocumentRecord, DocumentStatus,
    ReviewQueueStatus,
};
use docflow_llm::prompts::{
    build_base_user_prompt, build_correct_user_prompt, build_repair_user_prompt, BASE_SYSTEM,
    CORRECT_SYSTEM, REPAIR_SYSTEM,
};
use docflow_llm::{ChatClient, CompletionRequest, LlmError};

const MAX_LOG_OUTPUT_CHARS: usize = 2_000;
const TRANSPORT_RETRY_BASE: Duration = Duration::from_millis(200);

const PAYSLIP_MARKERS: [&str; 4] = ["gross pay", "net pay", "pay period", "payslip"];
const INVOICE_MARKERS: [&str; 3] = ["invoice", "total amount", "supplier"];

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Activity failures, ordered roughly by layer.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("object store error: {0}")]
    Blob(#[from] BlobError),

    #[error("model transport exhausted after {attempts} attempt(s): {source}")]
    LlmExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("extraction failed after base1+repair1+base2: {0}")]
    ExtractionExhausted(#[source] NormalizeError),

    #[error("normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Tunables for the model-calling activities and the classifier.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Model name sent with every completion request.
    pub model: String,
    /// Per-request transport timeout.
    pub request_timeout: Duration,
    /// Transport-level attempts per model call (exponential backoff between).
    pub max_transport_attempts: u32,
    /// When no keyword set matches, classify as invoice (the default) instead
    /// of preserving `unknown` and routing the document to review.
    pub classify_unmatched_as_invoice: bool,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(30),
            max_transport_attempts: 3,
            classify_unmatched_as_invoice: true,
        }
    }
}

/// Output of the store-document activity.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub object_key: String,
    pub document_text: String,
}

/// A current extraction: canonical bytes plus model confidence.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub payload: Vec<u8>,
    pub confidence: f64,
}

/// Output of applying a reviewer correction. `payload` is `None` when the
/// corrections did not normalize; the failed-rules list then carries the
/// synthetic rule instead of an error.
#[derive(Debug, Clone)]
pub struct ReviewerCorrection {
    pub payload: Option<Vec<u8>>,
    pub confidence: f64,
    pub failed_rules: Vec<String>,
}

/// The activity set, bound to its stores and model transport.
pub struct Activities {
    store: Arc<dyn DocumentStore>,
    blob: Arc<dyn BlobStore>,
    chat: Arc<dyn ChatClient>,
    options: ActivityOptions,
}

impl Activities {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blob: Arc<dyn BlobStore>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self {
            store,
            blob,
            chat,
            options: ActivityOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ActivityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Put the upload in the object store and upsert the document row.
    pub async fn store_document(
        &self,
        document_id: &DocumentId,
        filename: &str,
        content: &[u8],
    ) -> Result<StoredDocument, ActivityError> {
        if let Some(existing) = self.store.get_document(document_id).await? {
            if existing.has_stored_content() {
                return Ok(StoredDocument {
                    object_key: existing.object_key,
                    document_text: existing.raw_text,
                });
            }
        }

        let object_key = self.blob.put_document(document_id, filename, content).await?;
        let document_text = String::from_utf8_lossy(content).into_owned();

        let mut record = DocumentRecord::received(document_id.clone(), filename);
        record.object_key = object_key.clone();
        record.raw_text = document_text.clone();
        record.status = DocumentStatus::Stored;
        self.store.upsert_document(record).await?;
        self.store
            .insert_audit(
                document_id,
                AuditState::Stored,
                json!({ "object_key": object_key }),
            )
            .await?;
        info!(document_id = %document_id, object_key = %object_key, "document stored");

        Ok(StoredDocument {
            object_key,
            document_text,
        })
    }

    /// Keyword classification over document text and filename.
    pub async fn detect_doc_type(
        &self,
        document_id: &DocumentId,
        filename: &str,
        document_text: &str,
    ) -> Result<DocType, ActivityError> {
        if let Some(existing) = self.store.get_document(document_id).await? {
            if existing.doc_type != DocType::Unknown {
                return Ok(existing.doc_type);
            }
            // an `unknown` label past the stored stage is a deliberate
            // classification, not missing work
            if !matches!(
                existing.status,
                DocumentStatus::Received | DocumentStatus::Stored
            ) {
                return Ok(existing.doc_type);
            }
        }

        let doc_type = classify(
            document_text,
            filename,
            self.options.classify_unmatched_as_invoice,
        );
        self.store
            .update_classification(document_id, doc_type)
            .await?;
        self.store
            .insert_audit(
                document_id,
                AuditState::Classified,
                json!({ "doc_type": doc_type }),
            )
            .await?;
        info!(document_id = %document_id, doc_type = %doc_type, "document classified");
        Ok(doc_type)
    }

    /// The extraction ladder: base attempt, repair attempt, base attempt.
    ///
    /// Every raw model output is persisted under its phase tag before the
    /// normalizer sees it, so failed attempts are auditable too.
    pub async fn extract_fields(
        &self,
        document_id: &DocumentId,
        doc_type: DocType,
        document_text: &str,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ActivityError> {
        if let Some((payload, confidence)) = self.store.current_extraction(document_id).await? {
            return Ok(Extraction {
                payload,
                confidence,
            });
        }

        let schema = schema_for(doc_type);
        let base_prompt = build_base_user_prompt(doc_type.as_str(), schema, document_text);

        let base1 = self.call_model(BASE_SYSTEM, &base_prompt, cancel).await?;
        self.record_attempt(document_id, AttemptPhase::BaseAttempt1, &base1)
            .await;
        let base1_err = match normalize(doc_type, &base1) {
            Ok((payload, confidence)) => {
                return self
                    .accept_extraction(document_id, payload, confidence, "base_1")
                    .await;
            }
            Err(err) => err,
        };
        warn!(
            document_id = %document_id,
            error = %base1_err,
            output = %truncate_for_log(&base1, MAX_LOG_OUTPUT_CHARS),
            "base attempt 1 failed to normalize"
        );

        let repair_prompt = build_repair_user_prompt(schema, &base1);
        let repair1 = self
            .call_model(REPAIR_SYSTEM, &repair_prompt, cancel)
            .await?;
        self.record_attempt(document_id, AttemptPhase::RepairAttempt1, &repair1)
            .await;
        let repair1_err = match normalize(doc_type, &repair1) {
            Ok((payload, confidence)) => {
                return self
                    .accept_extraction(document_id, payload, confidence, "repair_1")
                    .await;
            }
            Err(err) => err,
        };
        warn!(
            document_id = %document_id,
            error = %repair1_err,
            "repair attempt failed to normalize"
        );

        let base2 = self.call_model(BASE_SYSTEM, &base_prompt, cancel).await?;
        self.record_attempt(document_id, AttemptPhase::BaseAttempt2, &base2)
            .await;
        match normalize(doc_type, &base2) {
            Ok((payload, confidence)) => {
                self.accept_extraction(document_id, payload, confidence, "base_2")
                    .await
            }
            Err(err) => Err(ActivityError::ExtractionExhausted(err)),
        }
    }

    /// Pure rule validation over canonical bytes.
    pub async fn validate_fields(
        &self,
        doc_type: DocType,
        payload: &[u8],
    ) -> Result<RuleReport, ActivityError> {
        Ok(rules::validate(doc_type, payload)?)
    }

    /// One correction pass under the CORRECT prompt set.
    pub async fn correct_fields(
        &self,
        document_id: &DocumentId,
        doc_type: DocType,
        document_text: &str,
        current_json: &[u8],
        failed_rules: &[String],
        cancel: &CancellationToken,
    ) -> Result<Extraction, ActivityError> {
        let schema = schema_for(doc_type);
        let current = String::from_utf8_lossy(current_json);
        let prompt =
            build_correct_user_prompt(doc_type.as_str(), schema, document_text, &current, failed_rules);

        let output = self.call_model(CORRECT_SYSTEM, &prompt, cancel).await?;
        self.record_attempt(document_id, AttemptPhase::CorrectAttempt1, &output)
            .await;

        let (payload, confidence) = normalize(doc_type, &output)?;
        self.store
            .save_current_extraction(document_id, &payload, confidence)
            .await?;
        info!(document_id = %document_id, confidence, "correction pass accepted");
        Ok(Extraction {
            payload,
            confidence,
        })
    }

    /// Queue the document for human review. The review-queue upsert and the
    /// document status change commit atomically in the store.
    pub async fn queue_review(
        &self,
        document_id: &DocumentId,
        failed_rules: &[String],
        current_json: &[u8],
    ) -> Result<(), ActivityError> {
        if self
            .review_already_queued(document_id, failed_rules, current_json)
            .await?
        {
            return Ok(());
        }

        self.store
            .queue_review(document_id, failed_rules, current_json)
            .await?;
        self.store
            .insert_audit(
                document_id,
                AuditState::NeedsReview,
                json!({ "failed_rules": failed_rules }),
            )
            .await?;
        info!(
            document_id = %document_id,
            failed_rules = ?failed_rules,
            "document queued for review"
        );
        Ok(())
    }

    /// Last-writer-wins review resolution. Callers on the approve/persist
    /// paths treat failures here as best-effort.
    pub async fn resolve_review(
        &self,
        document_id: &DocumentId,
        decision: ReviewQueueStatus,
    ) -> Result<(), ActivityError> {
        Ok(self.store.resolve_review(document_id, decision).await?)
    }

    /// Normalize and re-validate reviewer-supplied corrections. Malformed
    /// corrections come back as a synthetic failed rule, never an error, so
    /// the workflow can re-queue instead of dying.
    pub async fn apply_reviewer_correction(
        &self,
        document_id: &DocumentId,
        doc_type: DocType,
        corrections: &str,
    ) -> Result<ReviewerCorrection, ActivityError> {
        let (payload, confidence) = match normalize(doc_type, corrections) {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(document_id = %document_id, error = %err, "reviewer corrections rejected");
                return Ok(ReviewerCorrection {
                    payload: None,
                    confidence: 0.0,
                    failed_rules: vec![RULE_REVIEWER_CORRECTIONS_INVALID_JSON.to_string()],
                });
            }
        };

        self.store
            .save_current_extraction(document_id, &payload, confidence)
            .await?;
        let report = rules::validate(doc_type, &payload)?;
        Ok(ReviewerCorrection {
            payload: Some(payload),
            confidence,
            failed_rules: report.failed_rules,
        })
    }

    /// Terminal success: persist the final payload and close out the review
    /// item if one exists.
    pub async fn persist_result(
        &self,
        document_id: &DocumentId,
        final_json: &[u8],
        confidence: f64,
    ) -> Result<(), ActivityError> {
        if self.already_terminal(document_id, DocumentStatus::Completed).await? {
            return Ok(());
        }

        self.store
            .save_final_result(
                document_id,
                Some(final_json),
                confidence,
                DocumentStatus::Completed,
                None,
            )
            .await?;
        if let Err(err) = self
            .store
            .resolve_review(document_id, ReviewQueueStatus::Completed)
            .await
        {
            warn!(document_id = %document_id, error = %err, "review resolution skipped");
        }
        self.store
            .insert_audit(
                document_id,
                AuditState::Completed,
                json!({ "confidence": confidence }),
            )
            .await?;
        info!(document_id = %document_id, confidence, "document completed");
        Ok(())
    }

    /// Terminal rejection.
    pub async fn reject_document(
        &self,
        document_id: &DocumentId,
        reason: Option<&str>,
    ) -> Result<(), ActivityError> {
        if self.already_terminal(document_id, DocumentStatus::Rejected).await? {
            return Ok(());
        }

        let reason = match reason {
            Some(r) if !r.is_empty() => r,
            _ => "rejected by reviewer",
        };
        self.store
            .save_final_result(document_id, None, 0.0, DocumentStatus::Rejected, Some(reason))
            .await?;
        if let Err(err) = self
            .store
            .resolve_review(document_id, ReviewQueueStatus::Rejected)
            .await
        {
            warn!(document_id = %document_id, error = %err, "review resolution skipped");
        }
        self.store
            .insert_audit(document_id, AuditState::Rejected, json!({ "reason": reason }))
            .await?;
        info!(document_id = %document_id, reason, "document rejected");
        Ok(())
    }

    async fn accept_extraction(
        &self,
        document_id: &DocumentId,
        payload: Vec<u8>,
        confidence: f64,
        path: &str,
    ) -> Result<Extraction, ActivityError> {
        self.store
            .save_current_extraction(document_id, &payload, confidence)
            .await?;
        self.store
            .insert_audit(document_id, AuditState::Extracted, json!({ "path": path }))
            .await?;
        info!(document_id = %document_id, path, confidence, "extraction accepted");
        Ok(Extraction {
            payload,
            confidence,
        })
    }

    // Raw model output is evidence; losing a row must not abort the ladder.
    async fn record_attempt(&self, document_id: &DocumentId, phase: AttemptPhase, output: &str) {
        if let Err(err) = self
            .store
            .save_model_output(document_id, phase, output)
            .await
        {
            warn!(
                document_id = %document_id,
                phase = %phase,
                error = %err,
                "model output not recorded"
            );
        }
    }

    async fn review_already_queued(
        &self,
        document_id: &DocumentId,
        failed_rules: &[String],
        current_json: &[u8],
    ) -> Result<bool, ActivityError> {
        let Some(record) = self.store.get_document(document_id).await? else {
            return Ok(false);
        };
        if record.status != DocumentStatus::NeedsReview {
            return Ok(false);
        }
        let pending = self
            .store
            .list_pending_reviews()
            .await?
            .into_iter()
            .any(|item| {
                item.document_id == *document_id
                    && item.failed_rules == failed_rules
                    && item.current_json == current_json
            });
        Ok(pending)
    }

    async fn already_terminal(
        &self,
        document_id: &DocumentId,
        status: DocumentStatus,
    ) -> Result<bool, ActivityError> {
        Ok(self
            .store
            .document_status(document_id)
            .await?
            .map(|(current, _)| current == status)
            .unwrap_or(false))
    }

    /// One logical model call: up to `max_transport_attempts` transport tries
    /// with 200ms × 2ⁿ⁻¹ backoff, honoring cancellation between sleeps.
    async fn call_model(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ActivityError> {
        let max_attempts = self.options.max_transport_attempts.max(1);
        let mut last_err: Option<LlmError> = None;

        for attempt in 1..=max_attempts {
            let request = CompletionRequest {
                model: self.options.model.clone(),
                system: system.to_string(),
                user: user.to_string(),
                timeout: self.options.request_timeout,
            };
            match self.chat.complete_json(request).await {
                Ok(output) => return Ok(output),
                Err(err) => {
                    warn!(attempt, error = %err, "model call failed");
                    last_err = Some(err);
                }
            }
            if attempt == max_attempts {
                break;
            }
            let delay = TRANSPORT_RETRY_BASE * (1 << (attempt - 1));
            tokio::select! {
                _ = cancel.cancelled() => return Err(ActivityError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Err(ActivityError::LlmExhausted {
            attempts: max_attempts,
            source: last_err.unwrap_or_else(|| LlmError::Response("no attempts made".to_string())),
        })
    }
}

fn classify(document_text: &str, filename: &str, unmatched_is_invoice: bool) -> DocType {
    let norm = format!("{} {}", document_text, filename).to_lowercase();
    if PAYSLIP_MARKERS.iter().any(|m| norm.contains(m)) {
        return DocType::Payslip;
    }
    if INVOICE_MARKERS.iter().any(|m| norm.contains(m)) {
        return DocType::Invoice;
    }
    if unmatched_is_invoice {
        DocType::Invoice
    } else {
        DocType::Unknown
    }
}
