//! In-process scheduler running pipelines on the tokio runtime.

use super::RunHandle;
use crate::cancellation::CancellationToken;
use crate::core::RunOutcome;
use crate::errors::GenflowError;
use crate::pipeline::{PipelineDescriptor, PipelineRunner};
use crate::steps::panic_message;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Submits and cancels pipeline runs.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Starts a run of `descriptor` and returns its handle.
    async fn submit(&self, descriptor: PipelineDescriptor) -> Result<RunHandle, GenflowError>;

    /// Requests cooperative cancellation of a run.
    ///
    /// Returns false if the run is unknown or was already cancelled.
    fn cancel(&self, handle: &RunHandle, reason: &str) -> bool;
}

/// Number of uncollected outcomes a scheduler keeps by default.
pub const DEFAULT_RETAINED_OUTCOMES: usize = 1024;

struct LocalRun {
    token: Arc<CancellationToken>,
    done: watch::Receiver<Option<RunOutcome>>,
}

/// Outcomes of finished runs awaiting collection, oldest evicted first.
struct FinishedRuns {
    capacity: usize,
    outcomes: HashMap<RunHandle, RunOutcome>,
    order: VecDeque<RunHandle>,
}

impl FinishedRuns {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            outcomes: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, handle: RunHandle, outcome: RunOutcome) {
        self.outcomes.insert(handle.clone(), outcome);
        self.order.push_back(handle);
        while self.outcomes.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.outcomes.remove(&oldest).is_some() {
                debug!(run_id = %oldest, "Evicted uncollected run outcome");
            }
        }
    }

    fn take(&mut self, handle: &RunHandle) -> Option<RunOutcome> {
        let outcome = self.outcomes.remove(handle)?;
        self.order.retain(|h| h != handle);
        Some(outcome)
    }
}

/// Runs each submitted pipeline as a tokio task.
///
/// A run is active until its task finishes; its outcome is then kept until
/// collected through `outcome`, up to a fixed number of uncollected outcomes.
pub struct LocalScheduler {
    runner: Arc<PipelineRunner>,
    runs: Arc<DashMap<RunHandle, LocalRun>>,
    finished: Arc<Mutex<FinishedRuns>>,
}

impl LocalScheduler {
    /// Creates a scheduler driving `runner`.
    #[must_use]
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self {
            runner,
            runs: Arc::new(DashMap::new()),
            finished: Arc::new(Mutex::new(FinishedRuns::new(DEFAULT_RETAINED_OUTCOMES))),
        }
    }

    /// Sets how many uncollected outcomes are kept.
    #[must_use]
    pub fn with_retained_outcomes(self, capacity: usize) -> Self {
        *self.finished.lock() = FinishedRuns::new(capacity.max(1));
        self
    }

    /// Waits for a run to finish and returns its outcome.
    ///
    /// Each outcome can be collected once.
    pub async fn outcome(&self, handle: &RunHandle) -> Result<RunOutcome, GenflowError> {
        let done = self.runs.get(handle).map(|run| run.done.clone());
        if let Some(mut done) = done {
            done.wait_for(Option::is_some)
                .await
                .map_err(|_| GenflowError::internal(format!("Run '{handle}' aborted")))?;
        }

        self.finished.lock().take(handle).ok_or_else(|| {
            GenflowError::internal(format!("Unknown run '{handle}' or outcome already collected"))
        })
    }

    /// Returns the number of runs still executing.
    #[must_use]
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    /// Returns the number of finished runs whose outcome was not collected.
    #[must_use]
    pub fn uncollected_outcomes(&self) -> usize {
        self.finished.lock().outcomes.len()
    }
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("active_runs", &self.runs.len())
            .field("uncollected_outcomes", &self.uncollected_outcomes())
            .finish()
    }
}

#[async_trait]
impl JobScheduler for LocalScheduler {
    async fn submit(&self, descriptor: PipelineDescriptor) -> Result<RunHandle, GenflowError> {
        let handle = RunHandle::new();
        let token = Arc::new(CancellationToken::new());
        let (done_tx, done_rx) = watch::channel(None);

        info!(run_id = %handle, workflow = %descriptor.name(), "Submitting pipeline run");
        self.runs.insert(
            handle.clone(),
            LocalRun {
                token: token.clone(),
                done: done_rx,
            },
        );

        let runner = self.runner.clone();
        let runs = self.runs.clone();
        let finished = self.finished.clone();
        let run_id = handle.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(runner.run(descriptor, run_id.clone(), token))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    error!(run_id = %run_id, "Pipeline run panicked: {}", panic_message(&*panic));
                    RunOutcome::failed(
                        GenflowError::internal(format!(
                            "Run panicked: {}",
                            panic_message(&*panic)
                        ))
                        .to_detail(),
                    )
                });

            finished.lock().insert(run_id.clone(), outcome.clone());
            runs.remove(&run_id);
            let _ = done_tx.send(Some(outcome));
        });

        Ok(handle)
    }

    fn cancel(&self, handle: &RunHandle, reason: &str) -> bool {
        match self.runs.get(handle) {
            Some(run) => {
                let cancelled = run.token.cancel(reason);
                debug!(run_id = %handle, cancelled, "Cancellation requested");
                cancelled
            }
            None => false,
        }
    }
}
