//! Core domain model types for genflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Step kind, step status and run status enums
//! - Step output type with factory methods
//! - The terminal run outcome

mod outcome;
mod output;
mod status;

pub use outcome::RunOutcome;
pub use output::StepOutput;
pub use status::{RunStatus, StepKind, StepStatus};
