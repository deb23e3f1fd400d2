//! Per-activity execution policies.
//!
//! Every activity runs under a start-to-close timeout and a retry policy. The
//! two model-calling activities are capped at a single attempt so the
//! orchestration layer never duplicates model spend; the ladder inside the
//! extract activity provides the application-level retries instead.

use std::time::Duration;

/// Activity identifiers used for policy lookup and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    StoreDocument,
    DetectDocType,
    ExtractFields,
    ValidateFields,
    CorrectFields,
    QueueReview,
    ResolveReview,
    ApplyReviewerCorrection,
    PersistResult,
    RejectDocument,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::StoreDocument => "store_document",
            ActivityKind::DetectDocType => "detect_doc_type",
            ActivityKind::ExtractFields => "extract_fields",
            ActivityKind::ValidateFields => "validate_fields",
            ActivityKind::CorrectFields => "correct_fields",
            ActivityKind::QueueReview => "queue_review",
            ActivityKind::ResolveReview => "resolve_review",
            ActivityKind::ApplyReviewerCorrection => "apply_reviewer_correction",
            ActivityKind::PersistResult => "persist_result",
            ActivityKind::RejectDocument => "reject_document",
        }
    }

    /// Whether this activity spends model tokens when it runs.
    pub fn calls_model(&self) -> bool {
        matches!(self, ActivityKind::ExtractFields | ActivityKind::CorrectFields)
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy applied to a failing activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: u32,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
}

impl RetryPolicy {
    /// The default policy for plain store/validate activities.
    pub fn standard() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2,
            maximum_interval: Duration::from_secs(10),
            maximum_attempts: 3,
        }
    }

    /// One attempt only, for model-calling activities.
    pub fn single_attempt() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2,
            maximum_interval: Duration::from_secs(10),
            maximum_attempts: 1,
        }
    }

    /// Backoff delay before the next attempt, given how many retries have
    /// already been used.
    pub fn delay_for(&self, retries_used: u32) -> Duration {
        let base_ms = self.initial_interval.as_millis();
        if base_ms == 0 {
            return Duration::from_millis(0);
        }
        let max_ms = self.maximum_interval.as_millis().max(base_ms);
        let shift = retries_used.min(20);
        let multiplier = u128::from(self.backoff_coefficient.max(1)).pow(shift);
        let backoff_ms = base_ms.saturating_mul(multiplier).min(max_ms);
        let millis = u64::try_from(backoff_ms).unwrap_or(u64::MAX);
        Duration::from_millis(millis)
    }
}

/// Timeout plus retry policy for one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityPolicy {
    pub start_to_close: Duration,
    pub retry: RetryPolicy,
}

/// Policy table. Every activity gets the 2-minute start-to-close timeout;
/// model-calling activities are never retried at this layer.
pub fn policy_for(kind: ActivityKind) -> ActivityPolicy {
    let retry = if kind.calls_model() {
        RetryPolicy::single_attempt()
    } else {
        RetryPolicy::standard()
    };
    ActivityPolicy {
        start_to_close: Duration::from_secs(120),
        retry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_activities_get_single_attempt() {
        assert_eq!(
            policy_for(ActivityKind::ExtractFields).retry.maximum_attempts,
            1
        );
        assert_eq!(
            policy_for(ActivityKind::CorrectFields).retry.maximum_attempts,
            1
        );
        assert_eq!(
            policy_for(ActivityKind::StoreDocument).retry.maximum_attempts,
            3
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy::standard();
        assert_eq!(retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(2), Duration::from_secs(4));
        assert_eq!(retry.delay_for(3), Duration::from_secs(8));
        assert_eq!(retry.delay_for(4), Duration::from_secs(10));
        assert_eq!(retry.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn test_every_activity_has_two_minute_timeout() {
        for kind in [
            ActivityKind::StoreDocument,
            ActivityKind::DetectDocType,
            ActivityKind::ExtractFields,
            ActivityKind::ValidateFields,
            ActivityKind::CorrectFields,
            ActivityKind::QueueReview,
            ActivityKind::ResolveReview,
            ActivityKind::ApplyReviewerCorrection,
            ActivityKind::PersistResult,
            ActivityKind::RejectDocument,
        ] {
            assert_eq!(policy_for(kind).start_to_close, Duration::from_secs(120));
        }
    }
}
