//! Steps of the execution-engine-based workflow.

use super::Step;
use crate::context::{StepContext, ANALYSIS_HANDLE_KEY, EXECUTION_ID_KEY};
use crate::core::{StepKind, StepOutput};
use crate::engine::{
    AnalysisFile, ExecutionEngineClient, ExecutionRecord, ExecutionRecordStore, ExecutionStatus,
    ExternalExecutionId,
};
use crate::errors::{ExternalEngineFailure, GenflowError};
use crate::events;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Registers the analysis files with the external service.
#[derive(Debug, Clone)]
pub struct CreateExternalAnalysisStep {
    client: Arc<dyn ExecutionEngineClient>,
    files: Arc<[AnalysisFile]>,
}

impl CreateExternalAnalysisStep {
    /// Creates the step.
    #[must_use]
    pub fn new(client: Arc<dyn ExecutionEngineClient>, files: Vec<AnalysisFile>) -> Self {
        Self {
            client,
            files: files.into(),
        }
    }
}

#[async_trait]
impl Step for CreateExternalAnalysisStep {
    fn kind(&self) -> StepKind {
        StepKind::CreateExternalAnalysis
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let state = ctx.run().state();
        if let Some(handle) = state.analysis_handle()? {
            debug!(handle = %handle, "Analysis already registered");
            return Ok(StepOutput::ok_value(ANALYSIS_HANDLE_KEY, serde_json::json!(handle)));
        }

        let handle = self
            .client
            .create_analysis(ctx.target_source(), &self.files)
            .await?;
        state.set(ANALYSIS_HANDLE_KEY, &handle)?;

        info!(
            session_id = %ctx.session_id(),
            handle = %handle,
            files = self.files.len(),
            "Registered external analysis"
        );
        Ok(StepOutput::ok_value(ANALYSIS_HANDLE_KEY, serde_json::json!(handle)))
    }
}

/// Submits the registered analysis and records the returned execution id.
///
/// Completes as soon as the service accepted the submission.
#[derive(Debug, Clone)]
pub struct DispatchStep {
    client: Arc<dyn ExecutionEngineClient>,
    records: Arc<ExecutionRecordStore>,
}

impl DispatchStep {
    /// Creates the step.
    #[must_use]
    pub fn new(client: Arc<dyn ExecutionEngineClient>, records: Arc<ExecutionRecordStore>) -> Self {
        Self { client, records }
    }
}

#[async_trait]
impl Step for DispatchStep {
    fn kind(&self) -> StepKind {
        StepKind::DispatchToExecutionEngine
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let state = ctx.run().state();
        if let Some(id) = state.execution_id()? {
            debug!(execution_id = %id, "Analysis already dispatched");
            return Ok(StepOutput::ok_value(EXECUTION_ID_KEY, serde_json::json!(id)));
        }

        let handle = state.analysis_handle()?.ok_or_else(|| {
            GenflowError::internal("No analysis handle; the analysis was never registered")
        })?;

        let id = self.client.dispatch(&handle, ctx.target_source()).await?;
        self.records.create(&id)?;
        state.set(EXECUTION_ID_KEY, &id)?;

        ctx.try_emit_event(
            events::EXECUTION_DISPATCHED,
            Some(serde_json::json!({"external_execution_id": id})),
        );
        info!(session_id = %ctx.session_id(), execution_id = %id, "Dispatched to execution engine");
        Ok(StepOutput::ok_value(EXECUTION_ID_KEY, serde_json::json!(id)))
    }
}

/// Suspends until the execution's record leaves `Pending` or the timeout
/// elapses.
///
/// Waits on a change notification of the record, never by polling. The run's
/// cancellation is raced by the runner; `cancel` then seals the record so a
/// late callback has no effect.
#[derive(Debug, Clone)]
pub struct AwaitCallbackStep {
    records: Arc<ExecutionRecordStore>,
    timeout: Duration,
}

impl AwaitCallbackStep {
    /// Creates the step.
    #[must_use]
    pub fn new(records: Arc<ExecutionRecordStore>, timeout: Duration) -> Self {
        Self { records, timeout }
    }

    /// Returns the configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn execution_id(ctx: &StepContext) -> Result<ExternalExecutionId, GenflowError> {
        ctx.run()
            .state()
            .execution_id()?
            .ok_or_else(|| GenflowError::internal("No external execution id; nothing was dispatched"))
    }

    fn resolve(record: ExecutionRecord) -> Result<StepOutput, GenflowError> {
        let id = record.external_execution_id;
        match record.status {
            ExecutionStatus::Completed => {
                let mut data = HashMap::new();
                data.insert(EXECUTION_ID_KEY.to_string(), serde_json::json!(id));
                data.insert(
                    "result".to_string(),
                    record.result.unwrap_or(serde_json::Value::Null),
                );
                Ok(StepOutput::ok(data))
            }
            ExecutionStatus::Failed => Err(ExternalEngineFailure::Reported {
                execution_id: id.to_string(),
                message: record
                    .error
                    .unwrap_or_else(|| "No error detail reported".to_string()),
            }
            .into()),
            ExecutionStatus::Cancelled => Ok(StepOutput::cancel(format!(
                "External execution '{id}' was cancelled"
            ))),
            ExecutionStatus::Pending => Err(GenflowError::internal(format!(
                "External execution '{id}' resolved while pending"
            ))),
        }
    }
}

async fn wait_for_terminal(
    rx: &mut watch::Receiver<ExecutionRecord>,
) -> Result<ExecutionRecord, watch::error::RecvError> {
    loop {
        {
            let record = rx.borrow_and_update();
            if record.status.is_terminal() {
                return Ok(record.clone());
            }
        }
        rx.changed().await?;
    }
}

#[async_trait]
impl Step for AwaitCallbackStep {
    fn kind(&self) -> StepKind {
        StepKind::AwaitExecutionCallback
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let id = Self::execution_id(ctx)?;
        let mut rx = self.records.subscribe(&id).ok_or_else(|| {
            GenflowError::internal(format!("No execution record for '{id}'"))
        })?;

        debug!(execution_id = %id, timeout = ?self.timeout, "Awaiting execution callback");

        let record = match tokio::time::timeout(self.timeout, wait_for_terminal(&mut rx)).await {
            Ok(Ok(record)) => record,
            Ok(Err(_)) => {
                return Err(GenflowError::internal(format!(
                    "Execution record '{id}' was removed while awaited"
                )))
            }
            Err(_) => {
                let secs = self.timeout.as_secs_f64();
                if self
                    .records
                    .fail(&id, format!("No callback within {secs}s"))
                {
                    warn!(execution_id = %id, timeout_seconds = secs, "Execution callback timed out");
                    return Err(ExternalEngineFailure::TimedOut {
                        execution_id: id.to_string(),
                        timeout_seconds: secs,
                    }
                    .into());
                }
                // The callback landed between the deadline and the seal.
                self.records.get(&id).ok_or_else(|| {
                    GenflowError::internal(format!("Execution record '{id}' disappeared"))
                })?
            }
        };

        info!(execution_id = %id, status = %record.status, "Execution callback received");
        Self::resolve(record)
    }

    fn is_cancellable(&self) -> bool {
        true
    }

    async fn cancel(&self, ctx: &StepContext) -> Option<Result<StepOutput, GenflowError>> {
        let id = match Self::execution_id(ctx) {
            Ok(id) => id,
            Err(e) => {
                debug!("Nothing to seal on cancel: {}", e);
                return None;
            }
        };
        if self.records.cancel(&id) {
            info!(execution_id = %id, "Sealed execution record as cancelled");
            return None;
        }

        // The callback sealed the record first; its resolution stands.
        let record = self.records.get(&id).filter(|r| r.status.is_terminal())?;
        info!(execution_id = %id, status = %record.status, "Callback won the cancellation race");
        Some(Self::resolve(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::testing::{FakeExecutionEngine, TestRun};
    use serde_json::json;

    async fn dispatched(
        run: &TestRun,
        engine: Arc<FakeExecutionEngine>,
        records: Arc<ExecutionRecordStore>,
    ) -> ExternalExecutionId {
        let ctx = run.step_context("wf.createAnalysisExecution");
        CreateExternalAnalysisStep::new(engine.clone(), vec![AnalysisFile::new("a.json", "{}")])
            .execute(&ctx)
            .await
            .unwrap();
        let output = DispatchStep::new(engine, records)
            .execute(&run.step_context("wf.startExecutionEngine"))
            .await
            .unwrap();
        serde_json::from_value(output.get(EXECUTION_ID_KEY).unwrap().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_creates_pending_record() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new().with_execution_ids(["E-42"]));
        let records = Arc::new(ExecutionRecordStore::new());

        let id = dispatched(&run, engine.clone(), records.clone()).await;

        assert_eq!(id.as_str(), "E-42");
        assert_eq!(records.get(&id).unwrap().status, ExecutionStatus::Pending);
        assert_eq!(engine.created_analyses(), 1);
        assert_eq!(engine.dispatched(), vec![id]);
    }

    #[tokio::test]
    async fn test_dispatch_is_idempotent_on_retry() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new());
        let records = Arc::new(ExecutionRecordStore::new());
        dispatched(&run, engine.clone(), records.clone()).await;

        DispatchStep::new(engine.clone(), records.clone())
            .execute(&run.step_context("wf.startExecutionEngine"))
            .await
            .unwrap();

        assert_eq!(engine.dispatched().len(), 1);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_without_analysis_fails() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new());
        let err = DispatchStep::new(engine, Arc::new(ExecutionRecordStore::new()))
            .execute(&run.step_context("wf.startExecutionEngine"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Internal);
    }

    #[tokio::test]
    async fn test_await_resolves_with_callback_result() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new().with_execution_ids(["E-42"]));
        let records = Arc::new(ExecutionRecordStore::new());
        let id = dispatched(&run, engine, records.clone()).await;

        let callback = {
            let records = records.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                records.complete(&id, json!({"rows": 10}))
            })
        };

        let output = AwaitCallbackStep::new(records, Duration::from_secs(5))
            .execute(&run.step_context("wf.waitForCallback"))
            .await
            .unwrap();

        assert!(callback.await.unwrap());
        assert_eq!(output.get("result"), Some(&json!({"rows": 10})));
    }

    #[tokio::test]
    async fn test_await_reports_engine_failure() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new());
        let records = Arc::new(ExecutionRecordStore::new());
        let id = dispatched(&run, engine, records.clone()).await;
        records.fail(&id, "out of memory");

        let err = AwaitCallbackStep::new(records, Duration::from_secs(5))
            .execute(&run.step_context("wf.waitForCallback"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::ExternalEngineFailure);
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn test_await_times_out_and_seals_record() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new().with_execution_ids(["E-43"]));
        let records = Arc::new(ExecutionRecordStore::new());
        let id = dispatched(&run, engine, records.clone()).await;

        let err = AwaitCallbackStep::new(records.clone(), Duration::from_millis(30))
            .execute(&run.step_context("wf.waitForCallback"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::ExternalEngineTimeout);
        assert!(!records.complete(&id, json!({"rows": 1})));
        assert_eq!(records.get(&id).unwrap().status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_hook_discards_late_callback() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new());
        let records = Arc::new(ExecutionRecordStore::new());
        let id = dispatched(&run, engine, records.clone()).await;
        let step = AwaitCallbackStep::new(records.clone(), Duration::from_secs(5));

        assert!(step.is_cancellable());
        assert!(step.cancel(&run.step_context("wf.waitForCallback")).await.is_none());

        assert!(!records.complete(&id, json!({"rows": 10})));
        let output = step
            .execute(&run.step_context("wf.waitForCallback"))
            .await
            .unwrap();
        assert!(output.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_callback_keeps_callback_result() {
        let run = TestRun::new("S1");
        let engine = Arc::new(FakeExecutionEngine::new().with_execution_ids(["E-42"]));
        let records = Arc::new(ExecutionRecordStore::new());
        let id = dispatched(&run, engine, records.clone()).await;
        let step = AwaitCallbackStep::new(records.clone(), Duration::from_secs(5));

        assert!(records.complete(&id, json!({"rows": 10})));
        let settled = step
            .cancel(&run.step_context("wf.waitForCallback"))
            .await
            .expect("callback already settled the record")
            .unwrap();

        assert_eq!(settled.get("result"), Some(&json!({"rows": 10})));
        assert_eq!(records.get(&id).unwrap().status, ExecutionStatus::Completed);
    }
}
