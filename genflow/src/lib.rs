//! # Genflow
//!
//! Orchestration of analysis pipelines against shared target data sources.
//!
//! Genflow assembles and runs two kinds of multi-step workflows:
//!
//! - **Cohort-based**: create a session-scoped temp cohort table, populate it,
//!   run an isolated analysis step, then drop the table
//! - **Execution-engine-based**: register the analysis with an external engine,
//!   dispatch it, and suspend until the engine calls back or a deadline passes
//!
//! Every run carries a session whose identifier names its temporary
//! resources, so concurrent runs on one source never collide. Cleanup and
//! deregistration always run after the steps, whatever the outcome.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use genflow::prelude::*;
//!
//! let assembler = PipelineAssembler::new(connections).with_engine(engine);
//! let descriptor = assembler.assemble_cohort_based("cc", &source, cohorts, analysis)?;
//!
//! let scheduler = LocalScheduler::new(Arc::new(PipelineRunner::new(registry)));
//! let handle = scheduler.submit(descriptor).await?;
//! let outcome = scheduler.outcome(&handle).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod serialization;
pub mod session;
pub mod source;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::cleanup::TempResourceCleanupManager;
    pub use crate::config::GenflowConfig;
    pub use crate::context::{JobParameters, RunContext, StepContext};
    pub use crate::core::{RunOutcome, RunStatus, StepKind, StepOutput, StepStatus};
    pub use crate::engine::{
        AnalysisFile, ExecutionEngineClient, ExecutionRecordStore, ExternalExecutionId,
    };
    pub use crate::errors::{FailureDetail, FailureKind, GenflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        AssemblyOptions, PipelineAssembler, PipelineDescriptor, PipelineRunner, RetryConfig,
        Workflow, WorkflowKind,
    };
    pub use crate::scheduler::{
        InMemoryJobRegistry, JobRegistry, JobScheduler, LocalScheduler, RunHandle,
    };
    pub use crate::session::{new_session, Session, SessionId};
    pub use crate::source::{ConnectionProvider, Dialect, SourceConnection, TargetSource};
    pub use crate::steps::{CohortDefinition, CohortSupplier, Step};
}
