//! Domain type definitions.

mod document;
mod payload;
mod review;

pub use document::{
    AttemptPhase, AuditEntry, AuditState, DocType, DocumentId, DocumentRecord, DocumentStatus,
    ExtractionAttempt,
};
pub use payload::{
    schema_for, InvoiceFields, PayslipFields, INVOICE_JSON_SCHEMA, PAYSLIP_JSON_SCHEMA,
};
pub use review::{
    ReviewDecision, ReviewDecisionSignal, ReviewQueueItem, ReviewQueueStatus,
    REVIEW_DECISION_SIGNAL,
};
