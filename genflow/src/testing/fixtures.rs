//! Run-context fixture for step and runner tests.

use super::RecordingConnection;
use crate::cancellation::CancellationToken;
use crate::cleanup::TempResourceCleanupManager;
use crate::context::{RunContext, StepContext};
use crate::events::{EventSink, NoOpEventSink};
use crate::scheduler::RunHandle;
use crate::session::Session;
use crate::source::{DefaultRenderer, TargetSource};
use parking_lot::Mutex;
use std::sync::Arc;

/// Builds a `RunContext` wired to a `RecordingConnection`.
///
/// The context is built once and shared by every step context handed out.
pub struct TestRun {
    session_id: String,
    workflow: String,
    source: TargetSource,
    connection: Arc<RecordingConnection>,
    events: Arc<dyn EventSink>,
    built: Mutex<Option<Arc<RunContext>>>,
}

impl TestRun {
    /// Creates a fixture for workflow `wf` on a PostgreSQL source.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workflow: "wf".to_string(),
            source: TargetSource::new("synpuf", "pg", "synpuf-conn"),
            connection: Arc::new(RecordingConnection::new()),
            events: Arc::new(NoOpEventSink),
            built: Mutex::new(None),
        }
    }

    /// Sets the workflow name.
    #[must_use]
    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = workflow.into();
        self
    }

    /// Sets the target source.
    #[must_use]
    pub fn with_source(mut self, source: TargetSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the recording connection.
    #[must_use]
    pub fn connection(&self) -> Arc<RecordingConnection> {
        self.connection.clone()
    }

    /// Builds (once) and returns the run context.
    #[must_use]
    pub fn build(&self) -> Arc<RunContext> {
        self.built
            .lock()
            .get_or_insert_with(|| {
                let cleanup = Arc::new(
                    TempResourceCleanupManager::new(
                        self.source.clone(),
                        self.connection.clone(),
                        Arc::new(DefaultRenderer),
                    )
                    .with_event_sink(self.events.clone()),
                );
                Arc::new(
                    RunContext::new(
                        self.workflow.clone(),
                        Session::with_id(self.session_id.as_str()),
                        self.source.clone(),
                        self.connection.clone(),
                        Arc::new(DefaultRenderer),
                        cleanup,
                    )
                    .with_event_sink(self.events.clone()),
                )
            })
            .clone()
    }

    /// Returns a step context with a fresh cancellation token.
    #[must_use]
    pub fn step_context(&self, step_name: &str) -> StepContext {
        StepContext::new(
            self.build(),
            RunHandle::new(),
            step_name,
            Arc::new(CancellationToken::new()),
        )
    }
}
