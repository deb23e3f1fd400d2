//! Human review queue types and the reviewer decision signal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DocumentId;

/// Name of the signal channel a suspended workflow listens on.
pub const REVIEW_DECISION_SIGNAL: &str = "reviewDecision";

/// Review queue item lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewQueueStatus {
    Pending,
    Approved,
    Corrected,
    Rejected,
    Completed,
}

impl ReviewQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewQueueStatus::Pending => "PENDING",
            ReviewQueueStatus::Approved => "APPROVED",
            ReviewQueueStatus::Corrected => "CORRECTED",
            ReviewQueueStatus::Rejected => "REJECTED",
            ReviewQueueStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ReviewQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewQueueStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(ReviewQueueStatus::Pending),
            "APPROVED" => Ok(ReviewQueueStatus::Approved),
            "CORRECTED" => Ok(ReviewQueueStatus::Corrected),
            "REJECTED" => Ok(ReviewQueueStatus::Rejected),
            "COMPLETED" => Ok(ReviewQueueStatus::Completed),
            other => Err(format!("unrecognized review status {other:?}")),
        }
    }
}

/// One queued review item, keyed by document id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub document_id: DocumentId,
    pub failed_rules: Vec<String>,
    pub current_json: Vec<u8>,
    pub status: ReviewQueueStatus,
}

/// Reviewer decision carried by the signal. Anything the reviewer sends that
/// is not a recognized decision maps to `Unknown` and is ignored by the
/// workflow, which keeps waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
    Correct,
    #[serde(other)]
    Unknown,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
            ReviewDecision::Correct => "correct",
            ReviewDecision::Unknown => "unknown",
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approve" => Ok(ReviewDecision::Approve),
            "reject" => Ok(ReviewDecision::Reject),
            "correct" => Ok(ReviewDecision::Correct),
            other => Err(format!("unrecognized review decision {other:?}")),
        }
    }
}

/// Payload delivered on the `reviewDecision` channel.
///
/// `corrections` carries the reviewer-supplied replacement payload as raw JSON
/// text; it is deliberately not parsed before delivery so that malformed input
/// reaches the apply-correction activity, which reports it as a failed rule
/// instead of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecisionSignal {
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrections: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReviewDecisionSignal {
    pub fn approve() -> Self {
        Self {
            decision: ReviewDecision::Approve,
            corrections: None,
            reviewer: None,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: ReviewDecision::Reject,
            corrections: None,
            reviewer: None,
            reason: Some(reason.into()),
        }
    }

    pub fn correct(corrections: impl Into<String>) -> Self {
        Self {
            decision: ReviewDecision::Correct,
            corrections: Some(corrections.into()),
            reviewer: None,
            reason: None,
        }
    }
}
