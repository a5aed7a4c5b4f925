//! Per-step view of a run.

use super::RunContext;
use crate::cancellation::CancellationToken;
use crate::scheduler::RunHandle;
use crate::session::SessionId;
use crate::source::TargetSource;
use std::sync::Arc;

/// The context handed to a single step execution.
///
/// Carries the session identifier, the target source and the run's
/// cancellation signal. Cheap to clone.
#[derive(Clone)]
pub struct StepContext {
    run: Arc<RunContext>,
    run_handle: RunHandle,
    step_name: String,
    cancellation: Arc<CancellationToken>,
}

impl StepContext {
    /// Creates a step context.
    #[must_use]
    pub fn new(
        run: Arc<RunContext>,
        run_handle: RunHandle,
        step_name: impl Into<String>,
        cancellation: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run,
            run_handle,
            step_name: step_name.into(),
            cancellation,
        }
    }

    /// Returns the owning run context.
    #[must_use]
    pub fn run(&self) -> &Arc<RunContext> {
        &self.run
    }

    /// Returns the run handle.
    #[must_use]
    pub fn run_handle(&self) -> &RunHandle {
        &self.run_handle
    }

    /// Returns the step name.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        self.run.session_id()
    }

    /// Returns the target source.
    #[must_use]
    pub fn target_source(&self) -> &TargetSource {
        self.run.target_source()
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Emits an audit event enriched with run and step identity.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = data.unwrap_or(serde_json::json!({}));

        if let serde_json::Value::Object(ref mut map) = enriched {
            map.insert("run_id".to_string(), serde_json::json!(self.run_handle.to_string()));
            map.insert("session_id".to_string(), serde_json::json!(self.session_id()));
            map.insert("workflow".to_string(), serde_json::json!(self.run.workflow_name()));
            map.insert("step".to_string(), serde_json::json!(&self.step_name));
        }

        self.run.events().try_emit(event_type, Some(enriched));
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("run_handle", &self.run_handle)
            .field("step_name", &self.step_name)
            .field("session_id", self.session_id())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
