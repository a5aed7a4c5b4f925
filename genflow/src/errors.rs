//! Error types for the genflow orchestration core.
//!
//! Every failure a step can produce is mapped onto a small, closed taxonomy
//! so the scheduler only ever sees classified outcomes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for genflow operations.
#[derive(Debug, Error)]
pub enum GenflowError {
    /// Pipeline assembly received invalid input.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Connectivity or statement failure against the target source.
    ///
    /// This is the only class eligible for step-boundary retry.
    #[error("Transient source error on '{source_key}': {message}")]
    TransientSource {
        /// The source the statement was issued against.
        source_key: String,
        /// The driver-level message.
        message: String,
    },

    /// A classified fault from an analysis or generation step.
    #[error("{0}")]
    StepFailure(#[from] StepFailure),

    /// The run observed its cancellation signal.
    #[error("Cancellation requested: {reason}")]
    CancellationRequested {
        /// The first reason passed to the cancellation token.
        reason: String,
    },

    /// The external execution service failed or never answered.
    #[error("{0}")]
    ExternalEngineFailure(#[from] ExternalEngineFailure),

    /// Temporary resources could not be dropped.
    #[error("{0}")]
    CleanupWarning(#[from] CleanupWarning),

    /// Analysis content could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A write-once run state key was written twice.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GenflowError {
    /// Creates a transient source error.
    #[must_use]
    pub fn transient(source_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientSource {
            source_key: source_key.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::CancellationRequested {
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the scheduler may retry the step that produced this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientSource { .. })
    }

    /// Returns true if this error represents an observed cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancellationRequested { .. })
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::TransientSource { .. } => FailureKind::TransientSource,
            Self::StepFailure(_) => FailureKind::StepFailure,
            Self::CancellationRequested { .. } => FailureKind::Cancelled,
            Self::ExternalEngineFailure(ExternalEngineFailure::TimedOut { .. }) => {
                FailureKind::ExternalEngineTimeout
            }
            Self::ExternalEngineFailure(_) => FailureKind::ExternalEngineFailure,
            Self::CleanupWarning(_) => FailureKind::CleanupWarning,
            Self::Serialization(_) => FailureKind::Serialization,
            Self::StateConflict(_) | Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Converts the error into a structured failure detail.
    #[must_use]
    pub fn to_detail(&self) -> FailureDetail {
        let mut detail = FailureDetail::new(self.kind(), self.to_string());
        match self {
            Self::TransientSource { source_key, .. } => {
                detail = detail.with_context_entry("source_key", source_key);
            }
            Self::StepFailure(failure) => {
                detail = detail
                    .with_step(&failure.step)
                    .with_context_entry("cause", failure.cause.to_string());
            }
            Self::ExternalEngineFailure(failure) => {
                detail = detail.with_context_entry("execution_id", failure.execution_id());
                if let ExternalEngineFailure::TimedOut { timeout_seconds, .. } = failure {
                    detail = detail.with_context_entry("timeout_seconds", timeout_seconds.to_string());
                }
            }
            Self::CleanupWarning(warning) => {
                detail = detail.with_context_entry("session_id", &warning.session_id);
            }
            _ => {}
        }
        detail
    }
}

impl From<serde_json::Error> for GenflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Classification of a failure, as exposed in run outcomes and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Invalid assembly input.
    Validation,
    /// Target source connectivity or statement failure.
    TransientSource,
    /// Fault inside an analysis or generation step.
    StepFailure,
    /// Cooperative cancellation was observed.
    Cancelled,
    /// The external engine reported a failure.
    ExternalEngineFailure,
    /// The external engine did not call back in time.
    ExternalEngineTimeout,
    /// Temporary resources could not be dropped.
    CleanupWarning,
    /// Encode/decode failure.
    Serialization,
    /// Anything else.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::TransientSource => "transient_source",
            Self::StepFailure => "step_failure",
            Self::Cancelled => "cancelled",
            Self::ExternalEngineFailure => "external_engine_failure",
            Self::ExternalEngineTimeout => "external_engine_timeout",
            Self::CleanupWarning => "cleanup_warning",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured failure information attached to a run outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// The failure classification.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
    /// The step that failed, if the failure is attributable to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl FailureDetail {
    /// Creates a new failure detail.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step: None,
            context: HashMap::new(),
        }
    }

    /// Sets the failing step, unless one is already recorded.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        if self.step.is_none() {
            self.step = Some(step.into());
        }
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline assembly input is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// How a step fault manifested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCause {
    /// The step returned an error.
    Error,
    /// The step returned a failed output.
    FailedOutput,
    /// The step panicked.
    Panic,
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::FailedOutput => write!(f, "failed_output"),
            Self::Panic => write!(f, "panic"),
        }
    }
}

/// A fault from an isolated step, re-surfaced as a single classified failure.
#[derive(Debug, Clone, Error)]
#[error("Step '{step}' failed: {message}")]
pub struct StepFailure {
    /// The step that failed.
    pub step: String,
    /// The original message.
    pub message: String,
    /// How the fault manifested.
    pub cause: FaultCause,
}

impl StepFailure {
    /// Creates a new step failure.
    #[must_use]
    pub fn new(step: impl Into<String>, message: impl Into<String>, cause: FaultCause) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            cause,
        }
    }
}

/// Failures of a dispatched external execution.
#[derive(Debug, Clone, Error)]
pub enum ExternalEngineFailure {
    /// The engine's callback marked the execution failed.
    #[error("External execution '{execution_id}' failed: {message}")]
    Reported {
        /// The external execution identifier.
        execution_id: String,
        /// The engine-supplied error.
        message: String,
    },

    /// No callback arrived within the configured timeout.
    #[error("External execution '{execution_id}' timed out after {timeout_seconds}s")]
    TimedOut {
        /// The external execution identifier.
        execution_id: String,
        /// The configured timeout in seconds.
        timeout_seconds: f64,
    },

    /// The engine client rejected a request.
    #[error("External engine request failed: {message}")]
    Client {
        /// The client-level error.
        message: String,
    },
}

impl ExternalEngineFailure {
    /// Returns the execution identifier involved, or an empty string for client errors.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        match self {
            Self::Reported { execution_id, .. } | Self::TimedOut { execution_id, .. } => {
                execution_id
            }
            Self::Client { .. } => "",
        }
    }
}

/// A cleanup pass that could not drop every resource.
///
/// Never overrides the run's primary outcome.
#[derive(Debug, Clone, Error)]
#[error("Cleanup for session '{session_id}' left {} resource(s): {}", .failures.len(), describe_failures(.failures))]
pub struct CleanupWarning {
    /// The session whose resources were being dropped.
    pub session_id: String,
    /// `(resource, message)` pairs for every failed drop.
    pub failures: Vec<(String, String)>,
}

impl CleanupWarning {
    /// Creates a new cleanup warning.
    #[must_use]
    pub fn new(session_id: impl Into<String>, failures: Vec<(String, String)>) -> Self {
        Self {
            session_id: session_id.into(),
            failures,
        }
    }
}

fn describe_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, msg)| format!("{name} ({msg})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(GenflowError::transient("src", "connection reset").is_retryable());
        assert!(!GenflowError::cancelled("user").is_retryable());
        assert!(!GenflowError::internal("boom").is_retryable());
        assert!(!GenflowError::from(StepFailure::new("a", "b", FaultCause::Error)).is_retryable());
    }

    #[test]
    fn test_timeout_is_classified_separately() {
        let err = GenflowError::from(ExternalEngineFailure::TimedOut {
            execution_id: "E-43".to_string(),
            timeout_seconds: 0.5,
        });
        assert_eq!(err.kind(), FailureKind::ExternalEngineTimeout);

        let detail = err.to_detail();
        assert_eq!(detail.context.get("execution_id"), Some(&"E-43".to_string()));
        assert!(detail.message.contains("timed out"));
    }

    #[test]
    fn test_step_failure_detail_records_step() {
        let err = GenflowError::from(StepFailure::new("cc.generate", "division by zero", FaultCause::Panic));
        let detail = err.to_detail();

        assert_eq!(detail.kind, FailureKind::StepFailure);
        assert_eq!(detail.step.as_deref(), Some("cc.generate"));
        assert_eq!(detail.context.get("cause"), Some(&"panic".to_string()));
    }

    #[test]
    fn test_with_step_keeps_first() {
        let detail = FailureDetail::new(FailureKind::Internal, "x")
            .with_step("first")
            .with_step("second");
        assert_eq!(detail.step.as_deref(), Some("first"));
    }

    #[test]
    fn test_cleanup_warning_message() {
        let warning = CleanupWarning::new(
            "S1",
            vec![("temp_cohort_S1".to_string(), "permission denied".to_string())],
        );
        let msg = warning.to_string();
        assert!(msg.contains("S1"));
        assert!(msg.contains("temp_cohort_S1 (permission denied)"));
    }

    #[test]
    fn test_failure_kind_serialize() {
        let json = serde_json::to_string(&FailureKind::ExternalEngineTimeout).unwrap();
        assert_eq!(json, r#""external_engine_timeout""#);
    }
}
