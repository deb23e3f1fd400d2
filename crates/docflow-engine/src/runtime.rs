//! In-process intake runtime.
//!
//! Starts one workflow task per document, routes reviewer signals to it by
//! workflow id, and makes duplicate starts a no-op so the object-created
//! event source can deliver at-least-once without spawning twins.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use docflow_core::types::{DocumentId, ReviewDecisionSignal, REVIEW_DECISION_SIGNAL};

use crate::activities::Activities;
use crate::signals::{SignalError, SignalHub};
use crate::workflow::{DocumentIntakeWorkflow, WorkflowError, WorkflowInput, WorkflowResult};

/// Runtime tunables.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Workflow ids are `"<prefix>-<document_id>"`.
    pub workflow_id_prefix: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            workflow_id_prefix: "doc-intake".to_string(),
        }
    }
}

/// Outcome of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(String),
    AlreadyStarted(String),
}

impl StartOutcome {
    pub fn workflow_id(&self) -> &str {
        match self {
            StartOutcome::Started(id) | StartOutcome::AlreadyStarted(id) => id,
        }
    }
}

struct WorkflowHandle {
    join: Option<JoinHandle<Result<WorkflowResult, WorkflowError>>>,
}

/// The intake runtime.
pub struct IntakeRuntime {
    activities: Arc<Activities>,
    hub: Arc<SignalHub>,
    options: RuntimeOptions,
    cancel: CancellationToken,
    handles: Mutex<HashMap<String, WorkflowHandle>>,
}

impl IntakeRuntime {
    pub fn new(activities: Arc<Activities>) -> Self {
        Self::with_options(activities, RuntimeOptions::default())
    }

    pub fn with_options(activities: Arc<Activities>, options: RuntimeOptions) -> Self {
        Self {
            activities,
            hub: Arc::new(SignalHub::new()),
            options,
            cancel: CancellationToken::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn workflow_id(&self, document_id: &DocumentId) -> String {
        format!("{}-{}", self.options.workflow_id_prefix, document_id)
    }

    /// Start the workflow for a document. Starting an already-started
    /// workflow is a no-op.
    pub async fn start(&self, input: WorkflowInput) -> StartOutcome {
        let workflow_id = self.workflow_id(&input.document_id);
        let mut handles = self.handles.lock().await;
        if handles.contains_key(&workflow_id) {
            info!(workflow_id = %workflow_id, "workflow already started");
            return StartOutcome::AlreadyStarted(workflow_id);
        }

        let receiver = self.hub.register(&workflow_id, REVIEW_DECISION_SIGNAL);
        let workflow =
            DocumentIntakeWorkflow::new(self.activities.clone(), self.cancel.child_token());
        let hub = self.hub.clone();
        let task_workflow_id = workflow_id.clone();

        let join = tokio::spawn(async move {
            let result = workflow.run(input, receiver).await;
            hub.deregister(&task_workflow_id, REVIEW_DECISION_SIGNAL);
            match &result {
                Ok(outcome) => info!(
                    workflow_id = %task_workflow_id,
                    status = %outcome.status,
                    "workflow finished"
                ),
                Err(err) => error!(
                    workflow_id = %task_workflow_id,
                    error = %err,
                    "workflow failed"
                ),
            }
            result
        });

        handles.insert(workflow_id.clone(), WorkflowHandle { join: Some(join) });
        info!(workflow_id = %workflow_id, "workflow started");
        StartOutcome::Started(workflow_id)
    }

    /// Deliver a reviewer decision to the running workflow of a document.
    pub fn signal_review(
        &self,
        document_id: &DocumentId,
        signal: ReviewDecisionSignal,
    ) -> Result<(), SignalError> {
        self.hub.deliver(
            &self.workflow_id(document_id),
            REVIEW_DECISION_SIGNAL,
            signal,
        )
    }

    /// Await a workflow's terminal result. Returns `None` when the document
    /// has no started workflow or it was already joined.
    pub async fn join(
        &self,
        document_id: &DocumentId,
    ) -> Option<Result<WorkflowResult, WorkflowError>> {
        let join = {
            let mut handles = self.handles.lock().await;
            handles
                .get_mut(&self.workflow_id(document_id))
                .and_then(|handle| handle.join.take())
        }?;
        Some(
            join.await
                .unwrap_or_else(|err| Err(WorkflowError::Task(err.to_string()))),
        )
    }

    /// Cancel every running workflow.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_llm::ScriptedChatClient;
    use docflow_stores::{DocumentStore, InMemoryBlobStore, InMemoryDocumentStore};
    use std::time::Duration;

    use docflow_core::types::{DocumentStatus, ReviewQueueStatus};

    const PAYSLIP_TEXT: &str = "Payslip. Gross pay 2000, net pay 1500.";
    const PAYSLIP_OK: &str = r#"{"employee_name":"Jane Doe","employer_name":"ACME Payroll","pay_period_start":"2025-01-01","pay_period_end":"2025-01-15","gross_pay":2000,"net_pay":1500,"tax_withheld":500,"confidence":0.93}"#;
    const PAYSLIP_LOW: &str = r#"{"employee_name":"Jane Doe","employer_name":"ACME Payroll","pay_period_start":"2025-01-01","pay_period_end":"2025-01-15","gross_pay":2000,"net_pay":1500,"tax_withheld":500,"confidence":0.70}"#;

    fn runtime(script: Vec<&str>) -> (Arc<InMemoryDocumentStore>, IntakeRuntime) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let blob = Arc::new(InMemoryBlobStore::new());
        let chat = Arc::new(ScriptedChatClient::with_responses(script));
        let activities = Arc::new(Activities::new(store.clone(), blob, chat));
        (store, IntakeRuntime::new(activities))
    }

    fn input(document_id: &DocumentId) -> WorkflowInput {
        WorkflowInput {
            document_id: document_id.clone(),
            filename: "payslip.txt".to_string(),
            content: PAYSLIP_TEXT.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_start_runs_to_completion_and_duplicates_are_noops() {
        tokio_test::block_on(async {
            let (store, runtime) = runtime(vec![PAYSLIP_OK]);
            let id = DocumentId::generate();

            let first = runtime.start(input(&id)).await;
            assert_eq!(
                first,
                StartOutcome::Started(format!("doc-intake-{}", id))
            );
            let second = runtime.start(input(&id)).await;
            assert!(matches!(second, StartOutcome::AlreadyStarted(_)));

            let result = runtime.join(&id).await.unwrap().unwrap();
            assert_eq!(result.status, DocumentStatus::Completed);
            let record = store.get_document(&id).await.unwrap().unwrap();
            assert_eq!(record.status, DocumentStatus::Completed);
        });
    }

    #[test]
    fn test_signal_review_reaches_suspended_workflow() {
        tokio_test::block_on(async {
            let (store, runtime) = runtime(vec![PAYSLIP_LOW, PAYSLIP_LOW]);
            let id = DocumentId::generate();
            runtime.start(input(&id)).await;

            // wait for the workflow to suspend on review
            let mut queued = false;
            for _ in 0..100 {
                if let Some(item) = store.review_item(&id) {
                    if item.status == ReviewQueueStatus::Pending {
                        queued = true;
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(queued, "workflow never queued a review");

            runtime
                .signal_review(&id, ReviewDecisionSignal::approve())
                .unwrap();
            let result = runtime.join(&id).await.unwrap().unwrap();
            assert_eq!(result.status, DocumentStatus::Completed);
        });
    }

    #[test]
    fn test_signal_without_workflow_errors() {
        tokio_test::block_on(async {
            let (_, runtime) = runtime(vec![]);
            let id = DocumentId::generate();
            assert!(matches!(
                runtime.signal_review(&id, ReviewDecisionSignal::approve()),
                Err(SignalError::NotRegistered { .. })
            ));
        });
    }

    #[test]
    fn test_signal_after_completion_errors() {
        tokio_test::block_on(async {
            let (_, runtime) = runtime(vec![PAYSLIP_OK]);
            let id = DocumentId::generate();
            runtime.start(input(&id)).await;
            runtime.join(&id).await.unwrap().unwrap();

            assert!(matches!(
                runtime.signal_review(&id, ReviewDecisionSignal::approve()),
                Err(SignalError::NotRegistered { .. })
            ));
        });
    }
}
