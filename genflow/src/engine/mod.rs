//! External execution bridge.
//!
//! The client seam submits analyses to an external execution service; the
//! record store is where that service's callbacks land and where the await
//! step observes them.

mod client;
mod record;

pub use client::{AnalysisFile, AnalysisHandle, ExecutionEngineClient, ExternalExecutionId};
pub use record::{ExecutionRecord, ExecutionRecordStore, ExecutionStatus};
