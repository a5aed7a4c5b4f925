//! Fault isolation for caller-supplied analysis steps.

use super::Step;
use crate::context::StepContext;
use crate::core::{StepKind, StepOutput};
use crate::errors::{FaultCause, GenflowError, StepFailure};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

/// Wraps a step so that any fault becomes a classified `StepFailure`.
///
/// Errors, failed outputs and panics of the inner step all trigger cleanup
/// of the session's temp resources before the failure is returned.
/// Cancellation passes through untouched; the runner's listeners clean up.
#[derive(Debug, Clone)]
pub struct IsolatedStep {
    inner: Arc<dyn Step>,
}

impl IsolatedStep {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Step>) -> Self {
        Self { inner }
    }

    /// Returns the wrapped step.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Step> {
        &self.inner
    }

    async fn fail(&self, ctx: &StepContext, failure: StepFailure) -> GenflowError {
        error!(
            session_id = %ctx.session_id(),
            step = %failure.step,
            cause = %failure.cause,
            "Isolated step failed: {}",
            failure.message
        );

        if let Err(warning) = ctx.run().cleanup().cleanup(ctx.session_id()).await {
            warn!(session_id = %ctx.session_id(), "Cleanup after step failure incomplete: {}", warning);
        }

        GenflowError::StepFailure(failure)
    }
}

#[async_trait]
impl Step for IsolatedStep {
    fn kind(&self) -> StepKind {
        self.inner.kind()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let result = AssertUnwindSafe(self.inner.execute(ctx)).catch_unwind().await;

        let failure = match result {
            Ok(Ok(output)) if output.is_failure() => StepFailure::new(
                ctx.step_name(),
                output.error.unwrap_or_else(|| "Step reported failure".to_string()),
                FaultCause::FailedOutput,
            ),
            Ok(Ok(output)) => return Ok(output),
            Ok(Err(e)) if e.is_cancellation() => return Err(e),
            Ok(Err(e)) => StepFailure::new(ctx.step_name(), e.to_string(), FaultCause::Error),
            Err(panic) => {
                StepFailure::new(ctx.step_name(), panic_message(&*panic), FaultCause::Panic)
            }
        };

        Err(self.fail(ctx, failure).await)
    }

    fn is_cancellable(&self) -> bool {
        self.inner.is_cancellable()
    }

    async fn cancel(&self, ctx: &StepContext) -> Option<Result<StepOutput, GenflowError>> {
        self.inner.cancel(ctx).await
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Dialect;
    use crate::testing::{FailingStep, PanickingStep, RecordingStep, TestRun};

    fn register_table(ctx: &StepContext) {
        ctx.run()
            .cleanup()
            .register(ctx.session_id(), "temp_cohort_S1", Dialect::PostgreSql);
    }

    #[tokio::test]
    async fn test_success_passes_through_without_cleanup() {
        let run = TestRun::new("S1");
        let ctx = run.step_context("wf.generate");
        register_table(&ctx);
        let step = IsolatedStep::new(Arc::new(RecordingStep::new()));

        let output = step.execute(&ctx).await.unwrap();

        assert!(output.is_success());
        assert!(run.connection().statements().is_empty());
        assert_eq!(ctx.run().cleanup().pending(ctx.session_id()).len(), 1);
    }

    #[tokio::test]
    async fn test_error_becomes_step_failure_after_cleanup() {
        let run = TestRun::new("S1");
        let ctx = run.step_context("wf.generate");
        register_table(&ctx);
        let step = IsolatedStep::new(Arc::new(FailingStep::new("division by zero")));

        let err = step.execute(&ctx).await.unwrap_err();

        match err {
            GenflowError::StepFailure(failure) => {
                assert_eq!(failure.step, "wf.generate");
                assert_eq!(failure.cause, FaultCause::Error);
                assert!(failure.message.contains("division by zero"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            run.connection().statements(),
            vec!["DROP TABLE IF EXISTS temp_cohort_S1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_output_is_classified() {
        let run = TestRun::new("S1");
        let ctx = run.step_context("wf.generate");
        let step = IsolatedStep::new(Arc::new(FailingStep::new("bad input").as_output()));

        let err = step.execute(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            GenflowError::StepFailure(StepFailure { cause: FaultCause::FailedOutput, .. })
        ));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let run = TestRun::new("S1");
        let ctx = run.step_context("wf.generate");
        register_table(&ctx);
        let step = IsolatedStep::new(Arc::new(PanickingStep::new("index out of bounds")));

        let err = step.execute(&ctx).await.unwrap_err();

        match err {
            GenflowError::StepFailure(failure) => {
                assert_eq!(failure.cause, FaultCause::Panic);
                assert_eq!(failure.message, "index out of bounds");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ctx.run().cleanup().pending(ctx.session_id()).is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_warning_does_not_mask_failure() {
        let run = TestRun::new("S1");
        run.connection().fail_statements_containing("DROP");
        let ctx = run.step_context("wf.generate");
        register_table(&ctx);
        let step = IsolatedStep::new(Arc::new(FailingStep::new("boom")));

        let err = step.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, GenflowError::StepFailure(_)));
    }

    #[tokio::test]
    async fn test_cancellation_passes_through() {
        let run = TestRun::new("S1");
        let ctx = run.step_context("wf.generate");
        register_table(&ctx);
        let step = IsolatedStep::new(Arc::new(FailingStep::with_error(|| {
            GenflowError::cancelled("stop")
        })));

        let err = step.execute(&ctx).await.unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(ctx.run().cleanup().pending(ctx.session_id()).len(), 1);
    }
}
