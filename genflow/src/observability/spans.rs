//! Spans for runs and steps.

use crate::context::StepContext;
use crate::scheduler::RunHandle;
use crate::session::SessionId;
use std::time::Instant;
use tracing::Span;

/// Span covering one pipeline run.
#[must_use]
pub fn run_span(handle: &RunHandle, workflow: &str, session_id: &SessionId) -> Span {
    tracing::info_span!(
        "pipeline_run",
        run_id = %handle,
        workflow = %workflow,
        session_id = %session_id,
    )
}

/// Span covering every attempt of one step.
#[must_use]
pub fn step_span(ctx: &StepContext) -> Span {
    tracing::debug_span!("step", step = %ctx.step_name(), session_id = %ctx.session_id())
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRun;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("cc.generate");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
        assert_eq!(timer.name(), "cc.generate");
    }

    #[test]
    fn test_spans_build_without_subscriber() {
        let run = TestRun::new("S1");
        let ctx = run.step_context("cc.generate");
        let _run = run_span(&RunHandle::new(), "cc", &SessionId::from("S1")).entered();
        let _step = step_span(&ctx).entered();
    }
}
