//! Assembly of the two fixed pipeline shapes.

use super::{PipelineDescriptor, StepSpec, WorkflowKind};
use crate::cleanup::TempResourceCleanupManager;
use crate::config::GenflowConfig;
use crate::context::RunContext;
use crate::engine::{AnalysisFile, ExecutionEngineClient, ExecutionRecordStore};
use crate::errors::{GenflowError, PipelineValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::session::{new_session, Session};
use crate::source::{ConnectionProvider, DefaultRenderer, StatementRenderer, TargetSource};
use crate::steps::{
    AwaitCallbackStep, CohortSupplier, CreateExternalAnalysisStep, CreateTempTableStep, DispatchStep,
    GenerateCohortStep, IsolatedStep, Step,
};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// What a pipeline should do, by workflow kind.
#[derive(Clone)]
pub enum Workflow {
    /// Materialize cohorts into a temp table, then run a local analysis.
    CohortBased {
        /// Produces the cohort definitions of the run.
        cohort_supplier: CohortSupplier,
        /// The caller's analysis; it runs inside the isolation layer.
        analysis_step: Arc<dyn Step>,
    },
    /// Hand the analysis to the external execution service.
    ExecutionEngineBased {
        /// The analysis package.
        analysis_files: Vec<AnalysisFile>,
    },
}

impl Workflow {
    /// Returns the kind of the workflow.
    #[must_use]
    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::CohortBased { .. } => WorkflowKind::CohortBased,
            Self::ExecutionEngineBased { .. } => WorkflowKind::ExecutionEngineBased,
        }
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CohortBased { analysis_step, .. } => f
                .debug_struct("CohortBased")
                .field("analysis_step", analysis_step)
                .finish_non_exhaustive(),
            Self::ExecutionEngineBased { analysis_files } => f
                .debug_struct("ExecutionEngineBased")
                .field("files", &analysis_files.len())
                .finish(),
        }
    }
}

/// Per-assembly options.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    session: Option<Session>,
    parameters: Vec<(String, String)>,
}

impl AssemblyOptions {
    /// Creates default options: a fresh session and no extra parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs in `session` instead of a fresh one.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Adds a job parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }
}

/// Step name suffixes of the cohort-based workflow.
const COHORT_STEP_SUFFIXES: [&str; 3] = ["createCohortTable", "generateCohort", "generate"];

/// Step name suffixes of the execution-engine-based workflow.
const ENGINE_STEP_SUFFIXES: [&str; 3] = [
    "createAnalysisExecution",
    "startExecutionEngine",
    "waitForCallback",
];

/// Builds pipeline descriptors.
///
/// Holds the collaborators every run needs and one cleanup manager per
/// target source, shared by all sessions on that source.
pub struct PipelineAssembler {
    connections: Arc<dyn ConnectionProvider>,
    renderer: Arc<dyn StatementRenderer>,
    engine: Option<Arc<dyn ExecutionEngineClient>>,
    records: Arc<ExecutionRecordStore>,
    events: Arc<dyn EventSink>,
    config: GenflowConfig,
    cleanup_managers: DashMap<String, Arc<TempResourceCleanupManager>>,
}

impl PipelineAssembler {
    /// Creates an assembler resolving connections through `connections`.
    #[must_use]
    pub fn new(connections: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            connections,
            renderer: Arc::new(DefaultRenderer),
            engine: None,
            records: Arc::new(ExecutionRecordStore::new()),
            events: Arc::new(NoOpEventSink),
            config: GenflowConfig::default(),
            cleanup_managers: DashMap::new(),
        }
    }

    /// Sets the statement renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn StatementRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sets the external execution service client.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn ExecutionEngineClient>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the store that callbacks write into.
    #[must_use]
    pub fn with_record_store(mut self, records: Arc<ExecutionRecordStore>) -> Self {
        self.records = records;
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the configuration. It is validated on every assembly.
    #[must_use]
    pub fn with_config(mut self, config: GenflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the execution record store.
    #[must_use]
    pub fn records(&self) -> &Arc<ExecutionRecordStore> {
        &self.records
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GenflowConfig {
        &self.config
    }

    /// Returns the cleanup manager of `source`, creating it on first use.
    ///
    /// Managers are shared per source key. A source whose key is already in
    /// use with a different dialect, connection or temp qualifier is rejected,
    /// since its drops would otherwise target the wrong schema.
    pub fn cleanup_manager(
        &self,
        source: &TargetSource,
    ) -> Result<Arc<TempResourceCleanupManager>, GenflowError> {
        if let Some(manager) = self.cleanup_managers.get(&source.source_key) {
            return same_source(manager.value(), source);
        }

        let timeout = self.config.cleanup_timeout()?;
        let connection = self.connections.connection(source)?;
        let manager = self
            .cleanup_managers
            .entry(source.source_key.clone())
            .or_insert_with(|| {
                Arc::new(
                    TempResourceCleanupManager::new(source.clone(), connection, self.renderer.clone())
                        .with_timeout(timeout)
                        .with_event_sink(self.events.clone()),
                )
            })
            .clone();
        same_source(&manager, source)
    }

    /// Assembles a cohort-based pipeline in a fresh session.
    ///
    /// Steps: create temp cohort table, generate cohorts, isolated analysis.
    pub fn assemble_cohort_based(
        &self,
        workflow_name: &str,
        target_source: &TargetSource,
        cohort_supplier: CohortSupplier,
        analysis_step: Arc<dyn Step>,
    ) -> Result<PipelineDescriptor, GenflowError> {
        self.assemble(
            workflow_name,
            target_source,
            Workflow::CohortBased {
                cohort_supplier,
                analysis_step,
            },
            AssemblyOptions::default(),
        )
    }

    /// Assembles an execution-engine-based pipeline in a fresh session.
    ///
    /// Steps: create external analysis, dispatch, await callback.
    pub fn assemble_execution_engine_based(
        &self,
        workflow_name: &str,
        target_source: &TargetSource,
        analysis_files: Vec<AnalysisFile>,
    ) -> Result<PipelineDescriptor, GenflowError> {
        self.assemble(
            workflow_name,
            target_source,
            Workflow::ExecutionEngineBased { analysis_files },
            AssemblyOptions::default(),
        )
    }

    /// Assembles a pipeline for `workflow`.
    pub fn assemble(
        &self,
        workflow_name: &str,
        target_source: &TargetSource,
        workflow: Workflow,
        options: AssemblyOptions,
    ) -> Result<PipelineDescriptor, GenflowError> {
        validate_names(workflow_name, target_source)?;
        self.config.validate()?;

        let session = options.session.unwrap_or_else(new_session);
        session.id.validate()?;

        let kind = workflow.kind();
        let steps = match workflow {
            Workflow::CohortBased {
                cohort_supplier,
                analysis_step,
            } => self.cohort_steps(workflow_name, cohort_supplier, analysis_step),
            Workflow::ExecutionEngineBased { analysis_files } => {
                self.engine_steps(workflow_name, analysis_files)?
            }
        };

        let context = RunContext::new(
            workflow_name,
            session,
            target_source.clone(),
            self.connections.connection(target_source)?,
            self.renderer.clone(),
            self.cleanup_manager(target_source)?,
        )
        .with_event_sink(self.events.clone())
        .with_execution_records(self.records.clone())
        .with_parameters(options.parameters);

        info!(
            workflow = %workflow_name,
            kind = %kind,
            session_id = %context.session_id(),
            source_key = %target_source.source_key,
            "Assembled pipeline"
        );
        Ok(PipelineDescriptor::new(kind, steps, Arc::new(context)))
    }

    fn cohort_steps(
        &self,
        workflow_name: &str,
        cohort_supplier: CohortSupplier,
        analysis_step: Arc<dyn Step>,
    ) -> Vec<StepSpec> {
        let [create, generate, analyze] = COHORT_STEP_SUFFIXES.map(|s| step_name(workflow_name, s));
        vec![
            StepSpec::new(create, Arc::new(CreateTempTableStep))
                .with_retry(self.config.step_retry.clone()),
            StepSpec::new(generate, Arc::new(GenerateCohortStep::new(cohort_supplier)))
                .with_retry(self.config.step_retry.clone()),
            StepSpec::new(analyze, Arc::new(IsolatedStep::new(analysis_step))),
        ]
    }

    fn engine_steps(
        &self,
        workflow_name: &str,
        analysis_files: Vec<AnalysisFile>,
    ) -> Result<Vec<StepSpec>, GenflowError> {
        let engine = self.engine.clone().ok_or_else(|| {
            PipelineValidationError::new("No execution engine client configured")
        })?;
        if analysis_files.is_empty() {
            return Err(PipelineValidationError::new("No analysis files to dispatch").into());
        }

        let [create, dispatch, wait] = ENGINE_STEP_SUFFIXES.map(|s| step_name(workflow_name, s));
        Ok(vec![
            StepSpec::new(
                create,
                Arc::new(CreateExternalAnalysisStep::new(engine.clone(), analysis_files)),
            )
            .with_retry(self.config.step_retry.clone()),
            StepSpec::new(dispatch, Arc::new(DispatchStep::new(engine, self.records.clone())))
                .with_retry(self.config.step_retry.clone()),
            StepSpec::new(
                wait,
                Arc::new(AwaitCallbackStep::new(
                    self.records.clone(),
                    self.config.await_timeout()?,
                )),
            ),
        ])
    }
}

impl fmt::Debug for PipelineAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineAssembler")
            .field("renderer", &self.renderer)
            .field("engine", &self.engine.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn step_name(workflow_name: &str, suffix: &str) -> String {
    format!("{workflow_name}.{suffix}")
}

fn same_source(
    manager: &Arc<TempResourceCleanupManager>,
    source: &TargetSource,
) -> Result<Arc<TempResourceCleanupManager>, GenflowError> {
    if manager.source() != source {
        return Err(PipelineValidationError::new(format!(
            "Target source '{}' is already registered with different settings",
            source.source_key
        ))
        .into());
    }
    Ok(manager.clone())
}

fn validate_names(workflow_name: &str, target_source: &TargetSource) -> Result<(), GenflowError> {
    if workflow_name.trim().is_empty() {
        return Err(PipelineValidationError::new("Workflow name must not be empty").into());
    }
    if target_source.source_key.trim().is_empty() {
        return Err(PipelineValidationError::new("Target source key must not be empty").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepKind;
    use crate::pipeline::CompletionListener;
    use crate::testing::{FakeExecutionEngine, RecordingConnection, RecordingStep, SingleConnectionProvider};
    use pretty_assertions::assert_eq;

    fn assembler() -> PipelineAssembler {
        let connection = Arc::new(RecordingConnection::new());
        PipelineAssembler::new(Arc::new(SingleConnectionProvider::new(connection)))
            .with_engine(Arc::new(FakeExecutionEngine::new()))
    }

    fn source() -> TargetSource {
        TargetSource::new("synpuf", "pg", "synpuf-conn")
    }

    fn no_cohorts() -> CohortSupplier {
        Arc::new(|_ctx: &crate::context::StepContext| Ok(Vec::new()))
    }

    #[test]
    fn test_cohort_based_order() {
        let descriptor = assembler()
            .assemble_cohort_based("cc", &source(), no_cohorts(), Arc::new(RecordingStep::new()))
            .unwrap();

        assert_eq!(descriptor.kind(), WorkflowKind::CohortBased);
        assert_eq!(
            descriptor.step_kinds(),
            vec![StepKind::CreateTempTable, StepKind::GenerateCohort, StepKind::RunAnalysis]
        );
        assert_eq!(
            descriptor.step_names(),
            vec!["cc.createCohortTable", "cc.generateCohort", "cc.generate"]
        );
        assert_eq!(
            descriptor.listeners(),
            &[CompletionListener::DropResources, CompletionListener::Deregister]
        );
    }

    #[test]
    fn test_execution_engine_based_order() {
        let descriptor = assembler()
            .assemble_execution_engine_based("plp", &source(), vec![AnalysisFile::new("a.json", "{}")])
            .unwrap();

        assert_eq!(descriptor.kind(), WorkflowKind::ExecutionEngineBased);
        assert_eq!(
            descriptor.step_kinds(),
            vec![
                StepKind::CreateExternalAnalysis,
                StepKind::DispatchToExecutionEngine,
                StepKind::AwaitExecutionCallback,
            ]
        );
        assert_eq!(
            descriptor.step_names(),
            vec!["plp.createAnalysisExecution", "plp.startExecutionEngine", "plp.waitForCallback"]
        );
        assert_eq!(descriptor.listeners().len(), 2);
        assert!(descriptor.steps()[2].retry().is_none());
    }

    #[test]
    fn test_every_assembly_gets_its_own_session() {
        let assembler = assembler();
        let a = assembler
            .assemble_cohort_based("cc", &source(), no_cohorts(), Arc::new(RecordingStep::new()))
            .unwrap();
        let b = assembler
            .assemble_cohort_based("cc", &source(), no_cohorts(), Arc::new(RecordingStep::new()))
            .unwrap();

        assert_ne!(a.session().id, b.session().id);
        assert!(Arc::ptr_eq(a.context().cleanup(), b.context().cleanup()));
    }

    #[test]
    fn test_parameters_carry_session_and_table() {
        let descriptor = assembler()
            .assemble(
                "cc",
                &source(),
                Workflow::CohortBased {
                    cohort_supplier: no_cohorts(),
                    analysis_step: Arc::new(RecordingStep::new()),
                },
                AssemblyOptions::new()
                    .with_session(Session::with_id("S1"))
                    .with_parameter("cdm_schema", "cdm"),
            )
            .unwrap();

        let params = descriptor.parameters();
        assert_eq!(params.session_id(), Some("S1"));
        assert_eq!(params.target_table(), Some("temp_cohort_S1"));
        assert_eq!(params.get("cdm_schema"), Some("cdm"));
    }

    #[test]
    fn test_validation_errors() {
        let assembler = assembler();
        let err = assembler
            .assemble_cohort_based(" ", &source(), no_cohorts(), Arc::new(RecordingStep::new()))
            .unwrap_err();
        assert!(matches!(err, GenflowError::Validation(_)));

        let err = assembler
            .assemble_execution_engine_based("plp", &source(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, GenflowError::Validation(_)));

        let without_engine = PipelineAssembler::new(Arc::new(SingleConnectionProvider::new(
            Arc::new(RecordingConnection::new()),
        )));
        let err = without_engine
            .assemble_execution_engine_based("plp", &source(), vec![AnalysisFile::new("a", "b")])
            .unwrap_err();
        assert!(err.to_string().contains("No execution engine"));
    }

    #[test]
    fn test_out_of_range_config_is_rejected_at_assembly() {
        let assembler = assembler().with_config(GenflowConfig::new().with_await_timeout(1e30));
        let err = assembler
            .assemble_execution_engine_based("plp", &source(), vec![AnalysisFile::new("a.json", "{}")])
            .unwrap_err();
        assert!(matches!(err, GenflowError::Validation(_)));

        let assembler = assembler.with_config(GenflowConfig::new().with_cleanup_timeout(-5.0));
        let err = assembler
            .assemble_cohort_based("cc", &source(), no_cohorts(), Arc::new(RecordingStep::new()))
            .unwrap_err();
        assert!(matches!(err, GenflowError::Validation(_)));
        assert!(assembler.cleanup_manager(&source()).is_err());
    }

    #[test]
    fn test_session_ids_must_be_identifier_safe() {
        let err = assembler()
            .assemble(
                "cc",
                &source(),
                Workflow::CohortBased {
                    cohort_supplier: no_cohorts(),
                    analysis_step: Arc::new(RecordingStep::new()),
                },
                AssemblyOptions::new().with_session(Session::with_id("s1; DROP TABLE person")),
            )
            .unwrap_err();
        assert!(matches!(err, GenflowError::Validation(_)));
    }

    #[test]
    fn test_conflicting_source_with_same_key_is_rejected() {
        let assembler = assembler();
        let manager = assembler.cleanup_manager(&source()).unwrap();
        assert!(Arc::ptr_eq(&manager, &assembler.cleanup_manager(&source()).unwrap()));

        let scratch = source().with_temp_qualifier("scratch");
        let err = assembler
            .assemble_cohort_based("cc", &scratch, no_cohorts(), Arc::new(RecordingStep::new()))
            .unwrap_err();
        assert!(matches!(err, GenflowError::Validation(_)));

        let other_dialect = TargetSource::new("synpuf", "sqlserver", "synpuf-conn");
        assert!(assembler.cleanup_manager(&other_dialect).is_err());
    }
}
