//! Audit event channel.
//!
//! Step lifecycle, listener and cleanup events are emitted here. Cleanup
//! warnings are only ever visible through this channel, never in a run's
//! primary status.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A step started executing.
pub const STEP_STARTED: &str = "step.started";
/// A step completed successfully.
pub const STEP_COMPLETED: &str = "step.completed";
/// A step failed, or was interrupted.
pub const STEP_FAILED: &str = "step.failed";
/// A step is being retried after a transient failure.
pub const STEP_RETRYING: &str = "step.retrying";
/// An analysis was submitted to the external execution service.
pub const EXECUTION_DISPATCHED: &str = "execution.dispatched";
/// A completion listener ran.
pub const LISTENER_COMPLETED: &str = "listener.completed";
/// A cleanup pass could not drop every resource.
pub const CLEANUP_WARNING: &str = "cleanup.warning";
/// A run reached its terminal outcome.
pub const RUN_COMPLETED: &str = "run.completed";
