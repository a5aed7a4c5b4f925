//! Test assertions for run outcomes.

use crate::core::{RunOutcome, RunStatus};
use crate::errors::FailureKind;

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(outcome: &RunOutcome) {
    assert!(
        outcome.is_success(),
        "Expected success, got status {:?} with failure {:?}",
        outcome.status,
        outcome.failure
    );
}

/// Asserts that the run failed.
pub fn assert_run_failed(outcome: &RunOutcome) {
    assert_eq!(
        outcome.status,
        RunStatus::Failed,
        "Expected failure, got status: {:?}",
        outcome.status
    );
}

/// Asserts that the run was cancelled.
pub fn assert_run_cancelled(outcome: &RunOutcome) {
    assert_eq!(
        outcome.status,
        RunStatus::Cancelled,
        "Expected cancellation, got status {:?} with failure {:?}",
        outcome.status,
        outcome.failure
    );
}

/// Asserts that the run failed with the given classification.
pub fn assert_outcome_failed_with(outcome: &RunOutcome, kind: FailureKind) {
    assert_run_failed(outcome);
    assert_eq!(
        outcome.failure_kind(),
        Some(kind),
        "Expected failure kind {:?}, got {:?}",
        kind,
        outcome.failure
    );
}
