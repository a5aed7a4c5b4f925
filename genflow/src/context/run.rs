//! Context owned by a single pipeline run.

use super::{JobParameters, RunState};
use crate::cleanup::TempResourceCleanupManager;
use crate::engine::ExecutionRecordStore;
use crate::events::{EventSink, NoOpEventSink};
use crate::session::{temp_table_name, Session, SessionId};
use crate::source::{SourceConnection, StatementRenderer, TargetSource};
use std::sync::Arc;

/// Everything a run's steps and listeners need, owned by that run.
///
/// Built by the assembler; never shared between runs. The cleanup manager
/// may be shared across runs on the same source, keyed by session.
pub struct RunContext {
    workflow_name: String,
    session: Session,
    target_source: TargetSource,
    parameters: JobParameters,
    connection: Arc<dyn SourceConnection>,
    renderer: Arc<dyn StatementRenderer>,
    cleanup: Arc<TempResourceCleanupManager>,
    events: Arc<dyn EventSink>,
    records: Option<Arc<ExecutionRecordStore>>,
    state: RunState,
}

impl RunContext {
    /// Creates a run context.
    #[must_use]
    pub fn new(
        workflow_name: impl Into<String>,
        session: Session,
        target_source: TargetSource,
        connection: Arc<dyn SourceConnection>,
        renderer: Arc<dyn StatementRenderer>,
        cleanup: Arc<TempResourceCleanupManager>,
    ) -> Self {
        let parameters = JobParameters::for_session(&session.id);
        Self {
            workflow_name: workflow_name.into(),
            session,
            target_source,
            parameters,
            connection,
            renderer,
            cleanup,
            events: Arc::new(NoOpEventSink),
            records: None,
            state: RunState::new(),
        }
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the store holding this run's execution record.
    #[must_use]
    pub fn with_execution_records(mut self, records: Arc<ExecutionRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Adds caller parameters on top of the session parameters.
    #[must_use]
    pub fn with_parameters<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.parameters = self.parameters.with(key, value);
        }
        self
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Returns the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Returns the target source.
    #[must_use]
    pub fn target_source(&self) -> &TargetSource {
        &self.target_source
    }

    /// Returns the job parameters.
    #[must_use]
    pub fn parameters(&self) -> &JobParameters {
        &self.parameters
    }

    /// Returns the source connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn SourceConnection> {
        &self.connection
    }

    /// Returns the statement renderer.
    #[must_use]
    pub fn renderer(&self) -> &Arc<dyn StatementRenderer> {
        &self.renderer
    }

    /// Returns the cleanup manager of the target source.
    #[must_use]
    pub fn cleanup(&self) -> &Arc<TempResourceCleanupManager> {
        &self.cleanup
    }

    /// Returns the audit sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns the execution record store, if one was attached.
    #[must_use]
    pub fn execution_records(&self) -> Option<&Arc<ExecutionRecordStore>> {
        self.records.as_ref()
    }

    /// Returns the write-once run state.
    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Returns the unqualified temp cohort table name of this session.
    #[must_use]
    pub fn temp_table(&self) -> String {
        temp_table_name(&self.session.id)
    }

    /// Returns the temp cohort table name qualified with the temp schema.
    #[must_use]
    pub fn qualified_temp_table(&self) -> String {
        self.target_source.qualify(&self.temp_table())
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("workflow_name", &self.workflow_name)
            .field("session_id", &self.session.id)
            .field("source_key", &self.target_source.source_key)
            .finish_non_exhaustive()
    }
}
