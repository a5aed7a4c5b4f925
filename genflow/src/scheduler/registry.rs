//! Run handles and the scheduler's job registry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one submitted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(Uuid);

impl RunHandle {
    /// Creates a new, time-ordered run handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying identifier.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The scheduler's bookkeeping of active runs.
///
/// A run is registered when it starts and deregistered by its last
/// completion listener.
#[cfg_attr(test, mockall::automock)]
pub trait JobRegistry: Send + Sync {
    /// Records a run as active.
    fn register(&self, handle: &RunHandle, workflow_name: &str);

    /// Removes a run. Returns false if it was not registered.
    fn deregister(&self, handle: &RunHandle) -> bool;

    /// Returns true if the run is registered.
    fn is_registered(&self, handle: &RunHandle) -> bool;
}

/// A registered run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredJob {
    /// Workflow the run executes.
    pub workflow_name: String,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

/// Process-local job registry.
#[derive(Debug, Default)]
pub struct InMemoryJobRegistry {
    jobs: DashMap<RunHandle, RegisteredJob>,
}

impl InMemoryJobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registered run.
    #[must_use]
    pub fn get(&self, handle: &RunHandle) -> Option<RegisteredJob> {
        self.jobs.get(handle).map(|job| job.clone())
    }

    /// Returns the number of registered runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no run is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn register(&self, handle: &RunHandle, workflow_name: &str) {
        self.jobs.insert(
            handle.clone(),
            RegisteredJob {
                workflow_name: workflow_name.to_string(),
                registered_at: Utc::now(),
            },
        );
    }

    fn deregister(&self, handle: &RunHandle) -> bool {
        self.jobs.remove(handle).is_some()
    }

    fn is_registered(&self, handle: &RunHandle) -> bool {
        self.jobs.contains_key(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let registry = InMemoryJobRegistry::new();
        let handle = RunHandle::new();

        registry.register(&handle, "cc");
        assert!(registry.is_registered(&handle));
        assert_eq!(registry.get(&handle).unwrap().workflow_name, "cc");

        assert!(registry.deregister(&handle));
        assert!(!registry.deregister(&handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handles_are_unique() {
        let handles: std::collections::HashSet<_> = (0..1000).map(|_| RunHandle::new()).collect();
        assert_eq!(handles.len(), 1000);
    }
}
