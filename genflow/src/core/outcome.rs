//! Terminal outcome of a pipeline run.

use super::RunStatus;
use crate::errors::{FailureDetail, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The terminal status and detail of one pipeline execution.
///
/// Produced once, when the last step resolves or the run short-circuits.
/// Cleanup warnings never appear here; they go to the audit channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Terminal status.
    pub status: RunStatus,
    /// Structured failure detail for failed and cancelled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    /// Data produced by the last step of a successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// When the outcome was determined.
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// Creates a succeeded outcome.
    #[must_use]
    pub fn succeeded(result: Option<serde_json::Value>) -> Self {
        Self {
            status: RunStatus::Succeeded,
            failure: None,
            result,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(detail: FailureDetail) -> Self {
        Self {
            status: RunStatus::Failed,
            failure: Some(detail),
            result: None,
            finished_at: Utc::now(),
        }
    }

    /// Creates a cancelled outcome.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Cancelled,
            failure: Some(FailureDetail::new(FailureKind::Cancelled, reason)),
            result: None,
            finished_at: Utc::now(),
        }
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Returns the failure classification, if any.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_succeeded_outcome() {
        let outcome = RunOutcome::succeeded(Some(json!({"rows": 10})));
        assert!(outcome.is_success());
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.result, Some(json!({"rows": 10})));
    }

    #[test]
    fn test_cancelled_outcome_carries_reason() {
        let outcome = RunOutcome::cancelled("user request");
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(outcome.failure.unwrap().message, "user request");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RunOutcome::failed(FailureDetail::new(FailureKind::StepFailure, "boom"));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["failure"]["kind"], json!("step_failure"));

        let back: RunOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(back, outcome);
    }
}
