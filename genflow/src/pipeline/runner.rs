//! Sequential execution of an assembled pipeline.

use super::retry::{should_retry, RetryDecision, RetryState};
use super::{CompletionListener, PipelineDescriptor, StepSpec};
use crate::cancellation::CancellationToken;
use crate::context::{RunContext, StepContext};
use crate::core::{RunOutcome, StepOutput};
use crate::errors::{FailureDetail, FailureKind, FaultCause, GenflowError, StepFailure};
use crate::events;
use crate::observability::{run_span, step_span, SpanTimer};
use crate::scheduler::{JobRegistry, RunHandle};
use crate::steps::panic_message;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// How a step resolved.
enum StepResolution {
    Completed(StepOutput),
    Cancelled(String),
    Failed(FailureDetail),
}

/// Executes pipelines: steps strictly in order, then the completion
/// listeners, then the terminal outcome.
///
/// Cancellation is observed at step boundaries, during retry back-off, and
/// inside cancellable steps. Cleanup always runs before an outcome is
/// returned, and cleanup warnings never change it.
pub struct PipelineRunner {
    registry: Arc<dyn JobRegistry>,
}

impl PipelineRunner {
    /// Creates a runner reporting to `registry`.
    #[must_use]
    pub fn new(registry: Arc<dyn JobRegistry>) -> Self {
        Self { registry }
    }

    /// Runs `descriptor` to its terminal outcome.
    pub async fn run(
        &self,
        descriptor: PipelineDescriptor,
        handle: RunHandle,
        token: Arc<CancellationToken>,
    ) -> RunOutcome {
        let context = descriptor.context().clone();
        self.registry.register(&handle, descriptor.name());
        info!(
            run_id = %handle,
            workflow = %descriptor.name(),
            session_id = %context.session_id(),
            "Pipeline run started"
        );

        let span = run_span(&handle, descriptor.name(), context.session_id());
        let outcome = self
            .run_steps(&descriptor, &handle, &token)
            .instrument(span.clone())
            .await;

        for listener in descriptor.listeners() {
            self.run_listener(*listener, &context, &handle)
                .instrument(span.clone())
                .await;
        }
        release_execution_record(&context, &handle);

        context.events().try_emit(
            events::RUN_COMPLETED,
            Some(serde_json::json!({
                "run_id": handle.to_string(),
                "workflow": descriptor.name(),
                "session_id": context.session_id(),
                "status": outcome.status,
                "failure_kind": outcome.failure_kind(),
            })),
        );
        info!(run_id = %handle, status = %outcome.status, "Pipeline run finished");
        outcome
    }

    async fn run_steps(
        &self,
        descriptor: &PipelineDescriptor,
        handle: &RunHandle,
        token: &Arc<CancellationToken>,
    ) -> RunOutcome {
        let mut last_output: Option<StepOutput> = None;

        for spec in descriptor.steps() {
            if token.is_cancelled() {
                let reason = token.reason().unwrap_or_default();
                info!(run_id = %handle, step = %spec.name(), "Cancelled before step");
                return RunOutcome::cancelled(reason);
            }

            let ctx = StepContext::new(
                descriptor.context().clone(),
                handle.clone(),
                spec.name(),
                token.clone(),
            );
            ctx.try_emit_event(
                events::STEP_STARTED,
                Some(serde_json::json!({"kind": spec.kind()})),
            );

            let timer = SpanTimer::start(spec.name());
            match self.execute_step(spec, &ctx).instrument(step_span(&ctx)).await {
                StepResolution::Completed(output) => {
                    ctx.try_emit_event(
                        events::STEP_COMPLETED,
                        Some(serde_json::json!({"kind": spec.kind(), "duration_ms": timer.elapsed_ms()})),
                    );
                    last_output = Some(output);
                }
                StepResolution::Cancelled(reason) => {
                    ctx.try_emit_event(
                        events::STEP_FAILED,
                        Some(serde_json::json!({"kind": spec.kind(), "cancelled": true, "reason": reason})),
                    );
                    info!(run_id = %handle, step = %spec.name(), reason = %reason, "Step cancelled");
                    return RunOutcome::cancelled(reason);
                }
                StepResolution::Failed(detail) => {
                    ctx.try_emit_event(
                        events::STEP_FAILED,
                        Some(serde_json::json!({"kind": spec.kind(), "failure": detail})),
                    );
                    error!(
                        run_id = %handle,
                        step = %spec.name(),
                        kind = %detail.kind,
                        "Step failed: {}",
                        detail.message
                    );
                    return RunOutcome::failed(detail);
                }
            }
        }

        RunOutcome::succeeded(last_output.and_then(|o| o.data_value()))
    }

    async fn execute_step(&self, spec: &StepSpec, ctx: &StepContext) -> StepResolution {
        let mut retry_state = RetryState::new();

        loop {
            let err = match self.attempt(spec, ctx).await {
                Ok(output) if output.is_cancelled() => {
                    return StepResolution::Cancelled(output.cancel_reason.unwrap_or_default());
                }
                Ok(output) if output.is_failure() => {
                    let message = output.error.unwrap_or_else(|| "Step reported failure".to_string());
                    return StepResolution::Failed(
                        FailureDetail::new(FailureKind::StepFailure, message).with_step(spec.name()),
                    );
                }
                Ok(output) => return StepResolution::Completed(output),
                Err(GenflowError::CancellationRequested { reason }) => {
                    return StepResolution::Cancelled(reason);
                }
                Err(e) => e,
            };

            let decision = match spec.retry() {
                Some(config) if err.is_retryable() => should_retry(&mut retry_state, config),
                _ => RetryDecision::GiveUp,
            };

            let RetryDecision::Retry(delay) = decision else {
                return StepResolution::Failed(err.to_detail().with_step(spec.name()));
            };

            warn!(
                step = %spec.name(),
                attempt = retry_state.attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying step after transient failure"
            );
            ctx.try_emit_event(
                events::STEP_RETRYING,
                Some(serde_json::json!({"attempt": retry_state.attempt, "error": err.to_string()})),
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.cancellation().cancelled() => {
                    return StepResolution::Cancelled(ctx.cancellation().reason().unwrap_or_default());
                }
            }
        }
    }

    /// One execution of a step, with panics classified and cancellable
    /// steps raced against the cancellation signal.
    async fn attempt(&self, spec: &StepSpec, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let step = spec.step();
        let guarded = AssertUnwindSafe(step.execute(ctx)).catch_unwind();

        let result = if step.is_cancellable() {
            tokio::select! {
                biased;
                result = guarded => result,
                () = ctx.cancellation().cancelled() => {
                    debug!(step = %spec.name(), "Interrupting cancellable step");
                    if let Some(settled) = step.cancel(ctx).await {
                        info!(step = %spec.name(), "Step settled before it could be interrupted");
                        return settled;
                    }
                    return Err(GenflowError::cancelled(
                        ctx.cancellation().reason().unwrap_or_default(),
                    ));
                }
            }
        } else {
            guarded.await
        };

        result.unwrap_or_else(|panic| {
            Err(StepFailure::new(spec.name(), panic_message(&*panic), FaultCause::Panic).into())
        })
    }

    async fn run_listener(
        &self,
        listener: CompletionListener,
        context: &Arc<RunContext>,
        handle: &RunHandle,
    ) {
        let session_id = context.session_id();
        let completed = match listener {
            CompletionListener::DropResources => {
                match context.cleanup().cleanup(session_id).await {
                    Ok(dropped) => {
                        debug!(run_id = %handle, dropped, "Dropped session resources");
                        true
                    }
                    Err(warning) => {
                        warn!(run_id = %handle, "{}", warning);
                        false
                    }
                }
            }
            CompletionListener::Deregister => {
                let registry = &self.registry;
                match std::panic::catch_unwind(AssertUnwindSafe(|| registry.deregister(handle))) {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!(run_id = %handle, "Run was not registered at deregistration");
                        false
                    }
                    Err(panic) => {
                        error!(run_id = %handle, "Deregistration panicked: {}", panic_message(&*panic));
                        false
                    }
                }
            }
        };

        context.events().try_emit(
            events::LISTENER_COMPLETED,
            Some(serde_json::json!({
                "run_id": handle.to_string(),
                "session_id": session_id,
                "listener": listener.name(),
                "clean": completed,
            })),
        );
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner").finish_non_exhaustive()
    }
}

/// Retires the run's execution record once its listeners have finished.
fn release_execution_record(context: &RunContext, handle: &RunHandle) {
    let Some(records) = context.execution_records() else {
        return;
    };
    match context.state().execution_id() {
        Ok(Some(id)) => {
            if let Some(record) = records.retire(&id) {
                debug!(run_id = %handle, execution_id = %id, status = %record.status, "Released execution record");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(run_id = %handle, "Unreadable execution id: {}", e),
    }
}
