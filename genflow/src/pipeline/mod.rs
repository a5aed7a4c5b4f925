//! Pipeline assembly and execution.
//!
//! This module provides:
//! - The closed `Workflow` variants and their fixed step orders
//! - Immutable pipeline descriptors
//! - The fixed completion listener list
//! - A sequential runner with step-boundary retry

mod assembler;
mod descriptor;
mod listeners;
mod retry;
mod runner;

pub use assembler::{AssemblyOptions, PipelineAssembler, Workflow};
pub use descriptor::{PipelineDescriptor, StepSpec, WorkflowKind};
pub use listeners::{CompletionListener, COMPLETION_LISTENERS};
pub use retry::{should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState};
pub use runner::PipelineRunner;
