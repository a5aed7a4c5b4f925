//! Steps for exercising runner and isolation behavior.

use crate::context::StepContext;
use crate::core::{StepKind, StepOutput};
use crate::errors::GenflowError;
use crate::steps::Step;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A step that records its calls and returns a configurable output.
#[derive(Debug)]
pub struct RecordingStep {
    kind: StepKind,
    output: Mutex<StepOutput>,
    calls: AtomicUsize,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl Default for RecordingStep {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStep {
    /// Creates an analysis step returning `{"rows": 10}`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: StepKind::RunAnalysis,
            output: Mutex::new(StepOutput::ok_value("rows", serde_json::json!(10))),
            calls: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Overrides the reported kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    /// Overrides the output.
    #[must_use]
    pub fn with_output(self, output: StepOutput) -> Self {
        *self.output.lock() = output;
        self
    }

    /// Appends the step name to `log` on every call.
    #[must_use]
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns how many times the step ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(ctx.step_name().to_string());
        }
        Ok(self.output.lock().clone())
    }
}

/// Builds the error a `FailingStep` returns.
type ErrorFactory = Arc<dyn Fn() -> GenflowError + Send + Sync>;

/// A step that always fails.
#[derive(Clone)]
pub struct FailingStep {
    error: ErrorFactory,
    message: String,
    as_output: bool,
}

impl FailingStep {
    /// Fails with an internal error carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let m = message.clone();
        Self {
            error: Arc::new(move || GenflowError::internal(m.clone())),
            message,
            as_output: false,
        }
    }

    /// Fails with the errors produced by `factory`.
    #[must_use]
    pub fn with_error<F>(factory: F) -> Self
    where
        F: Fn() -> GenflowError + Send + Sync + 'static,
    {
        Self {
            error: Arc::new(factory),
            message: String::new(),
            as_output: false,
        }
    }

    /// Reports the failure as a failed output instead of an error.
    #[must_use]
    pub fn as_output(mut self) -> Self {
        self.as_output = true;
        self
    }
}

impl fmt::Debug for FailingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingStep")
            .field("message", &self.message)
            .field("as_output", &self.as_output)
            .finish()
    }
}

#[async_trait]
impl Step for FailingStep {
    fn kind(&self) -> StepKind {
        StepKind::RunAnalysis
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        if self.as_output {
            return Ok(StepOutput::fail(self.message.clone()));
        }
        Err((self.error)())
    }
}

/// A step that panics.
#[derive(Debug, Clone)]
pub struct PanickingStep {
    message: String,
}

impl PanickingStep {
    /// Creates a step panicking with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Step for PanickingStep {
    fn kind(&self) -> StepKind {
        StepKind::RunAnalysis
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        panic!("{}", self.message);
    }
}

/// A step that fails transiently a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStep {
    kind: StepKind,
    remaining_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyStep {
    /// Creates a step failing `failures` times before succeeding.
    #[must_use]
    pub fn new(kind: StepKind, failures: usize) -> Self {
        Self {
            kind,
            remaining_failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the step ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for FlakyStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(GenflowError::transient(
                &ctx.target_source().source_key,
                "Connection reset by peer",
            ));
        }
        Ok(StepOutput::ok_empty())
    }
}
