//! Step kind, step status and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of step kinds a pipeline can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Creates the session's temporary cohort table.
    CreateTempTable,
    /// Materializes cohort membership rows into the temp table.
    GenerateCohort,
    /// Runs the caller-supplied analysis.
    RunAnalysis,
    /// Registers analysis files with the external execution service.
    CreateExternalAnalysis,
    /// Submits the run to the external execution service.
    DispatchToExecutionEngine,
    /// Suspends until the external service calls back.
    AwaitExecutionCallback,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTempTable => write!(f, "create_temp_table"),
            Self::GenerateCohort => write!(f, "generate_cohort"),
            Self::RunAnalysis => write!(f, "run_analysis"),
            Self::CreateExternalAnalysis => write!(f, "create_external_analysis"),
            Self::DispatchToExecutionEngine => write!(f, "dispatch_to_execution_engine"),
            Self::AwaitExecutionCallback => write!(f, "await_execution_callback"),
        }
    }
}

impl StepKind {
    /// Returns true if steps of this kind mutate the target source.
    #[must_use]
    pub fn mutates_source(&self) -> bool {
        matches!(self, Self::CreateTempTable | Self::GenerateCohort)
    }
}

/// The execution status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step completed successfully.
    #[default]
    Ok,
    /// Step observed cancellation.
    Cancel,
    /// Step failed.
    Fail,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Cancel => write!(f, "cancel"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// The terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step completed.
    Succeeded,
    /// A step failed.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_display() {
        assert_eq!(StepKind::CreateTempTable.to_string(), "create_temp_table");
        assert_eq!(StepKind::AwaitExecutionCallback.to_string(), "await_execution_callback");
    }

    #[test]
    fn test_only_local_sql_steps_mutate_source() {
        assert!(StepKind::CreateTempTable.mutates_source());
        assert!(StepKind::GenerateCohort.mutates_source());
        assert!(!StepKind::RunAnalysis.mutates_source());
        assert!(!StepKind::DispatchToExecutionEngine.mutates_source());
    }

    #[test]
    fn test_run_status_serialize() {
        let json = serde_json::to_string(&RunStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);

        let deserialized: RunStatus = serde_json::from_str(r#""succeeded""#).unwrap();
        assert_eq!(deserialized, RunStatus::Succeeded);
    }
}
