//! # Docflow Engine
//!
//! Durable document-intake orchestration:
//! - the side-effectful activity layer, idempotent by document id
//! - the extraction ladder (base → repair → base) inside the extract activity
//! - per-activity timeout/retry policies
//! - the deterministic workflow state machine with review suspension
//! - the in-process runtime that starts workflows and routes named signals
//!
//! The workflow performs no I/O of its own; every side effect lives in an
//! activity, and every activity checks persisted state before acting. That
//! pairing is what makes replay after a crash safe.

pub mod activities;
pub mod policies;
pub mod runtime;
pub mod signals;
pub mod workflow;

pub use activities::{
    Activities, ActivityError, ActivityOptions, Extraction, ReviewerCorrection, StoredDocument,
};
pub use policies::{policy_for, ActivityKind, ActivityPolicy, RetryPolicy};
pub use runtime::{IntakeRuntime, RuntimeOptions, StartOutcome};
pub use signals::{SignalError, SignalHub, SignalReceiver};
pub use workflow::{
    DocumentIntakeWorkflow, WorkflowError, WorkflowInput, WorkflowResult, CONFIDENCE_THRESHOLD,
};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
