//! Immutable description of one assembled pipeline run.

use super::{CompletionListener, RetryConfig, COMPLETION_LISTENERS};
use crate::context::{JobParameters, RunContext};
use crate::core::StepKind;
use crate::session::Session;
use crate::steps::Step;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The closed set of workflow shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Temp cohort table, cohort generation, then a local analysis step.
    CohortBased,
    /// Analysis registered with, dispatched to and awaited from an external engine.
    ExecutionEngineBased,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CohortBased => write!(f, "cohort_based"),
            Self::ExecutionEngineBased => write!(f, "execution_engine_based"),
        }
    }
}

/// One named step of a pipeline.
#[derive(Debug, Clone)]
pub struct StepSpec {
    name: String,
    step: Arc<dyn Step>,
    retry: Option<RetryConfig>,
}

impl StepSpec {
    /// Creates a step spec without retry.
    #[must_use]
    pub fn new(name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            name: name.into(),
            step,
            retry: None,
        }
    }

    /// Retries transient source failures of this step with `retry`.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step kind.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        self.step.kind()
    }

    /// Returns the step.
    #[must_use]
    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }

    /// Returns the retry policy, if any.
    #[must_use]
    pub fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }
}

/// An assembled pipeline: ordered steps, completion listeners and the
/// context the run owns.
///
/// Immutable once assembled and consumed by the run that executes it.
#[derive(Debug)]
pub struct PipelineDescriptor {
    kind: WorkflowKind,
    steps: Vec<StepSpec>,
    context: Arc<RunContext>,
}

impl PipelineDescriptor {
    pub(crate) fn new(kind: WorkflowKind, steps: Vec<StepSpec>, context: Arc<RunContext>) -> Self {
        Self {
            kind,
            steps,
            context,
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.context.workflow_name()
    }

    /// Returns the workflow kind.
    #[must_use]
    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Returns the step kinds in execution order.
    #[must_use]
    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(StepSpec::kind).collect()
    }

    /// Returns the step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(StepSpec::name).collect()
    }

    /// Returns the completion listeners in invocation order.
    #[must_use]
    pub fn listeners(&self) -> &'static [CompletionListener] {
        &COMPLETION_LISTENERS
    }

    /// Returns the session the run owns.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.context.session()
    }

    /// Returns the job parameters.
    #[must_use]
    pub fn parameters(&self) -> &JobParameters {
        self.context.parameters()
    }

    /// Returns the run context.
    #[must_use]
    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }
}
