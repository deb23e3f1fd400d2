//! The document-intake workflow state machine.
//!
//! Control flow is deterministic and replayable: activities execute
//! sequentially under per-activity policies, the only suspension points are
//! activity awaits and the review signal channel, and the workflow itself
//! holds no persistent state, reads no wall clock, and iterates nothing
//! unordered. Recovery after a crash is replay from the top; idempotent
//! activities short-circuit the work already done.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docflow_core::rules::{RuleReport, RULE_DOC_TYPE_UNKNOWN};
use docflow_core::types::{
    DocType, DocumentId, DocumentStatus, ReviewDecision, ReviewQueueStatus,
};

use crate::activities::{Activities, ActivityError, Extraction};
use crate::policies::{policy_for, ActivityKind};
use crate::signals::SignalReceiver;

/// A confidence below this routes the document to correction and review;
/// exactly at the threshold passes.
pub const CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Everything the workflow needs to drive one document.
#[derive(Debug, Clone)]
pub struct WorkflowInput {
    pub document_id: DocumentId,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Terminal outcome of a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowResult {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("activity {activity} failed after {attempts} attempt(s): {source}")]
    ActivityFailed {
        activity: &'static str,
        attempts: u32,
        #[source]
        source: ActivityError,
    },

    #[error("review signal channel closed")]
    SignalChannelClosed,

    #[error("workflow cancelled")]
    Cancelled,

    #[error("workflow task failed: {0}")]
    Task(String),
}

/// The orchestrator for a single document.
pub struct DocumentIntakeWorkflow {
    activities: Arc<Activities>,
    cancel: CancellationToken,
}

impl DocumentIntakeWorkflow {
    pub fn new(activities: Arc<Activities>, cancel: CancellationToken) -> Self {
        Self { activities, cancel }
    }

    /// Drive the document to a terminal state.
    pub async fn run(
        &self,
        input: WorkflowInput,
        mut signals: SignalReceiver,
    ) -> Result<WorkflowResult, WorkflowError> {
        let document_id = input.document_id.clone();
        info!(document_id = %document_id, filename = %input.filename, "workflow started");

        let stored = self
            .execute(ActivityKind::StoreDocument, || {
                self.activities
                    .store_document(&document_id, &input.filename, &input.content)
            })
            .await?;

        let doc_type = self
            .execute(ActivityKind::DetectDocType, || {
                self.activities
                    .detect_doc_type(&document_id, &input.filename, &stored.document_text)
            })
            .await?;

        if doc_type == DocType::Unknown {
            return self.review_unclassified(&document_id, &mut signals).await;
        }

        let mut extraction = self
            .execute(ActivityKind::ExtractFields, || {
                self.activities.extract_fields(
                    &document_id,
                    doc_type,
                    &stored.document_text,
                    &self.cancel,
                )
            })
            .await?;

        let mut report = self
            .execute(ActivityKind::ValidateFields, || {
                self.activities.validate_fields(doc_type, &extraction.payload)
            })
            .await?;

        if needs_attention(&report) {
            // one correction pass; a failed pass keeps the prior extraction
            // and validation rather than failing the workflow
            let corrected = self
                .execute(ActivityKind::CorrectFields, || {
                    self.activities.correct_fields(
                        &document_id,
                        doc_type,
                        &stored.document_text,
                        &extraction.payload,
                        &report.failed_rules,
                        &self.cancel,
                    )
                })
                .await;
            match corrected {
                Ok(corrected) => {
                    extraction = corrected;
                    report = self
                        .execute(ActivityKind::ValidateFields, || {
                            self.activities.validate_fields(doc_type, &extraction.payload)
                        })
                        .await?;
                }
                Err(err) => {
                    warn!(
                        document_id = %document_id,
                        error = %err,
                        "correction pass failed; keeping prior extraction"
                    );
                }
            }
        }

        if needs_attention(&report) {
            self.execute(ActivityKind::QueueReview, || {
                self.activities
                    .queue_review(&document_id, &report.failed_rules, &extraction.payload)
            })
            .await?;

            loop {
                let signal = self.next_signal(&mut signals).await?;
                match signal.decision {
                    ReviewDecision::Approve => {
                        let resolved = self
                            .execute(ActivityKind::ResolveReview, || {
                                self.activities
                                    .resolve_review(&document_id, ReviewQueueStatus::Approved)
                            })
                            .await;
                        if let Err(err) = resolved {
                            warn!(document_id = %document_id, error = %err, "approve resolution skipped");
                        }
                        break;
                    }
                    ReviewDecision::Reject => {
                        self.execute(ActivityKind::RejectDocument, || {
                            self.activities
                                .reject_document(&document_id, signal.reason.as_deref())
                        })
                        .await?;
                        return Ok(WorkflowResult {
                            document_id,
                            status: DocumentStatus::Rejected,
                        });
                    }
                    ReviewDecision::Correct => {
                        let corrections = signal.corrections.clone().unwrap_or_default();
                        let outcome = self
                            .execute(ActivityKind::ApplyReviewerCorrection, || {
                                self.activities.apply_reviewer_correction(
                                    &document_id,
                                    doc_type,
                                    &corrections,
                                )
                            })
                            .await?;

                        if let Some(payload) = outcome.payload {
                            extraction = Extraction {
                                payload,
                                confidence: outcome.confidence,
                            };
                            report.confidence = outcome.confidence;
                        }
                        report.failed_rules = outcome.failed_rules;

                        if report.passed() && report.confidence >= CONFIDENCE_THRESHOLD {
                            let resolved = self
                                .execute(ActivityKind::ResolveReview, || {
                                    self.activities
                                        .resolve_review(&document_id, ReviewQueueStatus::Corrected)
                                })
                                .await;
                            if let Err(err) = resolved {
                                warn!(document_id = %document_id, error = %err, "correct resolution skipped");
                            }
                            break;
                        }

                        self.execute(ActivityKind::QueueReview, || {
                            self.activities.queue_review(
                                &document_id,
                                &report.failed_rules,
                                &extraction.payload,
                            )
                        })
                        .await?;
                    }
                    ReviewDecision::Unknown => {
                        debug!(document_id = %document_id, "ignoring unrecognized review decision");
                    }
                }
            }
        }

        self.execute(ActivityKind::PersistResult, || {
            self.activities
                .persist_result(&document_id, &extraction.payload, extraction.confidence)
        })
        .await?;

        Ok(WorkflowResult {
            document_id,
            status: DocumentStatus::Completed,
        })
    }

    /// Review loop for documents the classifier deliberately left `unknown`.
    /// Without a typed extraction there is nothing to approve or correct, so
    /// only a reject decision resolves the document.
    async fn review_unclassified(
        &self,
        document_id: &DocumentId,
        signals: &mut SignalReceiver,
    ) -> Result<WorkflowResult, WorkflowError> {
        let failed_rules = vec![RULE_DOC_TYPE_UNKNOWN.to_string()];
        self.execute(ActivityKind::QueueReview, || {
            self.activities.queue_review(document_id, &failed_rules, b"{}")
        })
        .await?;

        loop {
            let signal = self.next_signal(signals).await?;
            match signal.decision {
                ReviewDecision::Reject => {
                    self.execute(ActivityKind::RejectDocument, || {
                        self.activities
                            .reject_document(document_id, signal.reason.as_deref())
                    })
                    .await?;
                    return Ok(WorkflowResult {
                        document_id: document_id.clone(),
                        status: DocumentStatus::Rejected,
                    });
                }
                other => {
                    warn!(
                        document_id = %document_id,
                        decision = other.as_str(),
                        "unclassified document only accepts reject"
                    );
                }
            }
        }
    }

    async fn next_signal(
        &self,
        signals: &mut SignalReceiver,
    ) -> Result<docflow_core::types::ReviewDecisionSignal, WorkflowError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            signal = signals.recv() => signal.ok_or(WorkflowError::SignalChannelClosed),
        }
    }

    /// Run one activity under its policy: start-to-close timeout per attempt,
    /// exponential backoff between attempts, cancellation everywhere.
    async fn execute<T, F, Fut>(&self, kind: ActivityKind, op: F) -> Result<T, WorkflowError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let policy = policy_for(kind);
        let mut attempt: u32 = 1;

        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                outcome = tokio::time::timeout(policy.start_to_close, op()) => outcome,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(ActivityError::Cancelled)) => return Err(WorkflowError::Cancelled),
                Ok(Err(err)) => err,
                Err(_) => ActivityError::Timeout(policy.start_to_close),
            };

            if attempt >= policy.retry.maximum_attempts {
                return Err(WorkflowError::ActivityFailed {
                    activity: kind.as_str(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = policy.retry.delay_for(attempt - 1);
            warn!(
                activity = kind.as_str(),
                attempt,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "retrying activity"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

fn needs_attention(report: &RuleReport) -> bool {
    !report.failed_rules.is_empty() || report.confidence < CONFIDENCE_THRESHOLD
}
