//! Step trait and the built-in step kinds.
//!
//! Steps are the ordered units of work of a pipeline. Each one closes over
//! the collaborators it needs and reads run-scoped data from its
//! `StepContext`; none of them touches process-wide state.

mod base;
mod cohort;
mod external;
mod isolation;

pub use base::{AsyncFnStep, FnStep, Step};
pub use cohort::{CohortDefinition, CohortSupplier, CreateTempTableStep, GenerateCohortStep};
pub use external::{AwaitCallbackStep, CreateExternalAnalysisStep, DispatchStep};
pub use isolation::IsolatedStep;
pub(crate) use isolation::panic_message;
