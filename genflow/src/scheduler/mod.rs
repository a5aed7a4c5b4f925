//! Job scheduler seam.
//!
//! Pipelines are executed by a scheduler; the registry is its bookkeeping
//! store and is only ever reached through the `JobRegistry` trait.

mod local;
mod registry;

pub use local::{JobScheduler, LocalScheduler};
pub use registry::{InMemoryJobRegistry, JobRegistry, RegisteredJob, RunHandle};

#[cfg(test)]
pub use registry::MockJobRegistry;
