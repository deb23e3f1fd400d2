//! Document identity, classification, and lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Strongly-typed document id (canonical UUID string form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Document classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Payslip,
    Invoice,
    #[default]
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Payslip => "payslip",
            DocType::Invoice => "invoice",
            DocType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "payslip" => Ok(DocType::Payslip),
            "invoice" => Ok(DocType::Invoice),
            "unknown" => Ok(DocType::Unknown),
            other => Err(format!("unrecognized doc type {other:?}")),
        }
    }
}

/// Document lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Received,
    Stored,
    Classified,
    Extracted,
    NeedsReview,
    Rejected,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Terminal statuses are never reopened by activities of the same workflow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::Rejected | DocumentStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Received => "RECEIVED",
            DocumentStatus::Stored => "STORED",
            DocumentStatus::Classified => "CLASSIFIED",
            DocumentStatus::Extracted => "EXTRACTED",
            DocumentStatus::NeedsReview => "NEEDS_REVIEW",
            DocumentStatus::Rejected => "REJECTED",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RECEIVED" => Ok(DocumentStatus::Received),
            "STORED" => Ok(DocumentStatus::Stored),
            "CLASSIFIED" => Ok(DocumentStatus::Classified),
            "EXTRACTED" => Ok(DocumentStatus::Extracted),
            "NEEDS_REVIEW" => Ok(DocumentStatus::NeedsReview),
            "REJECTED" => Ok(DocumentStatus::Rejected),
            "COMPLETED" => Ok(DocumentStatus::Completed),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => Err(format!("unrecognized document status {other:?}")),
        }
    }
}

/// Audit trail states. Every successful lifecycle transition appends exactly
/// one audit entry with the matching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditState {
    Stored,
    Classified,
    Extracted,
    NeedsReview,
    Completed,
    Rejected,
}

impl AuditState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditState::Stored => "STORED",
            AuditState::Classified => "CLASSIFIED",
            AuditState::Extracted => "EXTRACTED",
            AuditState::NeedsReview => "NEEDS_REVIEW",
            AuditState::Completed => "COMPLETED",
            AuditState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AuditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "STORED" => Ok(AuditState::Stored),
            "CLASSIFIED" => Ok(AuditState::Classified),
            "EXTRACTED" => Ok(AuditState::Extracted),
            "NEEDS_REVIEW" => Ok(AuditState::NeedsReview),
            "COMPLETED" => Ok(AuditState::Completed),
            "REJECTED" => Ok(AuditState::Rejected),
            other => Err(format!("unrecognized audit state {other:?}")),
        }
    }
}

/// Phase tag recorded with every raw model output, in ladder order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptPhase {
    #[serde(rename = "BASE_ATTEMPT_1")]
    BaseAttempt1,
    #[serde(rename = "REPAIR_ATTEMPT_1")]
    RepairAttempt1,
    #[serde(rename = "BASE_ATTEMPT_2")]
    BaseAttempt2,
    #[serde(rename = "CORRECT_ATTEMPT_1")]
    CorrectAttempt1,
}

impl AttemptPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptPhase::BaseAttempt1 => "BASE_ATTEMPT_1",
            AttemptPhase::RepairAttempt1 => "REPAIR_ATTEMPT_1",
            AttemptPhase::BaseAttempt2 => "BASE_ATTEMPT_2",
            AttemptPhase::CorrectAttempt1 => "CORRECT_ATTEMPT_1",
        }
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptPhase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "BASE_ATTEMPT_1" => Ok(AttemptPhase::BaseAttempt1),
            "REPAIR_ATTEMPT_1" => Ok(AttemptPhase::RepairAttempt1),
            "BASE_ATTEMPT_2" => Ok(AttemptPhase::BaseAttempt2),
            "CORRECT_ATTEMPT_1" => Ok(AttemptPhase::CorrectAttempt1),
            other => Err(format!("unrecognized attempt phase {other:?}")),
        }
    }
}

/// The persisted document row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    #[serde(default)]
    pub object_key: String,
    #[serde(default)]
    pub raw_text: String,
    pub doc_type: DocType,
    pub status: DocumentStatus,
    #[serde(default)]
    pub current_json: Option<Vec<u8>>,
    #[serde(default)]
    pub final_json: Option<Vec<u8>>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub rejected_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Fresh row as created by the ingress before any workflow activity runs.
    pub fn received(id: DocumentId, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            object_key: String::new(),
            raw_text: String::new(),
            doc_type: DocType::Unknown,
            status: DocumentStatus::Received,
            current_json: None,
            final_json: None,
            confidence: 0.0,
            rejected_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the store-document effect is already present.
    pub fn has_stored_content(&self) -> bool {
        !self.object_key.is_empty() && !self.raw_text.is_empty()
    }
}

/// Append-only record of one raw model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub document_id: DocumentId,
    pub phase: AttemptPhase,
    pub output: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub document_id: DocumentId,
    pub state: AuditState,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::Rejected.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::NeedsReview.is_terminal());
        assert!(!DocumentStatus::Received.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            DocumentStatus::Received,
            DocumentStatus::Stored,
            DocumentStatus::Classified,
            DocumentStatus::Extracted,
            DocumentStatus::NeedsReview,
            DocumentStatus::Rejected,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_attempt_phase_tags() {
        assert_eq!(AttemptPhase::BaseAttempt1.as_str(), "BASE_ATTEMPT_1");
        assert_eq!(AttemptPhase::RepairAttempt1.as_str(), "REPAIR_ATTEMPT_1");
        assert_eq!(AttemptPhase::BaseAttempt2.as_str(), "BASE_ATTEMPT_2");
        assert_eq!(AttemptPhase::CorrectAttempt1.as_str(), "CORRECT_ATTEMPT_1");
    }

    #[test]
    fn test_received_record_has_no_stored_content() {
        let rec = DocumentRecord::received(DocumentId::generate(), "payslip.txt");
        assert_eq!(rec.status, DocumentStatus::Received);
        assert_eq!(rec.doc_type, DocType::Unknown);
        assert!(!rec.has_stored_content());
    }
}
