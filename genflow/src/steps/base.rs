//! The step contract and closure adapters.

use crate::context::StepContext;
use crate::core::{StepKind, StepOutput};
use crate::errors::GenflowError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// A single ordered unit of pipeline work.
///
/// Steps must tolerate being re-executed after a transient source failure.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the kind of the step.
    fn kind(&self) -> StepKind;

    /// Executes the step.
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError>;

    /// Returns true if the step may be interrupted while suspended.
    ///
    /// The runner races cancellable steps against the run's cancellation
    /// signal; other steps complete their current unit of work first.
    fn is_cancellable(&self) -> bool {
        false
    }

    /// Called after the runner abandoned an in-flight execution because of
    /// cancellation.
    ///
    /// Returns `Some` with the step's own resolution when the step had
    /// already settled and could no longer be interrupted; the runner then
    /// reports that resolution instead of a cancellation.
    async fn cancel(&self, _ctx: &StepContext) -> Option<Result<StepOutput, GenflowError>> {
        None
    }
}

/// A step backed by a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, GenflowError> + Send + Sync,
{
    kind: StepKind,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, GenflowError> + Send + Sync,
{
    /// Creates an analysis step from a closure.
    pub fn new(func: F) -> Self {
        Self {
            kind: StepKind::RunAnalysis,
            func,
        }
    }

    /// Overrides the reported kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, GenflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("kind", &self.kind).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, GenflowError> + Send + Sync,
{
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        (self.func)(ctx)
    }
}

/// A step backed by an async closure receiving an owned context.
pub struct AsyncFnStep<F, Fut>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, GenflowError>> + Send,
{
    kind: StepKind,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStep<F, Fut>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, GenflowError>> + Send,
{
    /// Creates an analysis step from an async closure.
    pub fn new(func: F) -> Self {
        Self {
            kind: StepKind::RunAnalysis,
            func,
            _phantom: PhantomData,
        }
    }

    /// Overrides the reported kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F, Fut> Debug for AsyncFnStep<F, Fut>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, GenflowError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStep").field("kind", &self.kind).finish()
    }
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F, Fut>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, GenflowError>> + Send,
{
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        (self.func)(ctx.clone()).await
    }
}
