//! Run-owned context threaded through assembly and execution.
//!
//! This module provides:
//! - `RunContext`, built once per run by the assembler
//! - `StepContext`, the per-step view handed to `Step::execute`
//! - `JobParameters` and the write-once `RunState` bag

mod parameters;
mod run;
mod state;
mod step;

pub use parameters::{JobParameters, SESSION_ID_PARAM, TARGET_TABLE_PARAM};
pub use run::RunContext;
pub use state::{RunState, ANALYSIS_HANDLE_KEY, EXECUTION_ID_KEY};
pub use step::StepContext;
