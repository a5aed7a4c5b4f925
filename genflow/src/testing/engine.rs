//! Fake external execution service client.

use crate::engine::{AnalysisFile, AnalysisHandle, ExecutionEngineClient, ExternalExecutionId};
use crate::errors::{ExternalEngineFailure, GenflowError};
use crate::source::TargetSource;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An execution engine client that accepts everything and never calls back.
///
/// Callbacks are simulated by writing into an `ExecutionRecordStore`.
#[derive(Debug, Default)]
pub struct FakeExecutionEngine {
    ids: Mutex<VecDeque<String>>,
    created: Mutex<Vec<Vec<AnalysisFile>>>,
    dispatched: Mutex<Vec<ExternalExecutionId>>,
    counter: AtomicUsize,
    dispatch_error: Mutex<Option<String>>,
}

impl FakeExecutionEngine {
    /// Creates a new fake engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the execution ids returned by successive dispatches.
    #[must_use]
    pub fn with_execution_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.lock().extend(ids.into_iter().map(Into::into));
        self
    }

    /// Makes every dispatch fail with `message`.
    #[must_use]
    pub fn failing_dispatch(self, message: impl Into<String>) -> Self {
        *self.dispatch_error.lock() = Some(message.into());
        self
    }

    /// Returns how many analyses were registered.
    #[must_use]
    pub fn created_analyses(&self) -> usize {
        self.created.lock().len()
    }

    /// Returns the dispatched execution ids, in order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<ExternalExecutionId> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl ExecutionEngineClient for FakeExecutionEngine {
    async fn create_analysis(
        &self,
        _source: &TargetSource,
        files: &[AnalysisFile],
    ) -> Result<AnalysisHandle, GenflowError> {
        let mut created = self.created.lock();
        created.push(files.to_vec());
        Ok(AnalysisHandle::new(format!("A-{}", created.len())))
    }

    async fn dispatch(
        &self,
        _handle: &AnalysisHandle,
        _source: &TargetSource,
    ) -> Result<ExternalExecutionId, GenflowError> {
        if let Some(message) = self.dispatch_error.lock().clone() {
            return Err(ExternalEngineFailure::Client { message }.into());
        }

        let id = self.ids.lock().pop_front().unwrap_or_else(|| {
            format!("E-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        let id = ExternalExecutionId::new(id);
        self.dispatched.lock().push(id.clone());
        Ok(id)
    }
}
