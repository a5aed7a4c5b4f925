//! Write-once bag of values produced by one step for later steps.

use crate::engine::{AnalysisHandle, ExternalExecutionId};
use crate::errors::GenflowError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Key of the handle returned by the create-external-analysis step.
pub const ANALYSIS_HANDLE_KEY: &str = "analysis_handle";

/// Key of the identifier returned by the dispatch step.
pub const EXECUTION_ID_KEY: &str = "external_execution_id";

/// Thread-safe, write-once state of a run.
///
/// Writing to an existing key fails with `GenflowError::StateConflict`.
#[derive(Debug, Default)]
pub struct RunState {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl RunState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under a new key.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), GenflowError> {
        let key = key.into();
        let value = serde_json::to_value(value)?;
        let mut data = self.data.write();

        if data.contains_key(&key) {
            return Err(GenflowError::StateConflict(format!(
                "Run state key '{key}' is already set"
            )));
        }

        data.insert(key, value);
        Ok(())
    }

    /// Gets a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Gets and decodes a value.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, GenflowError> {
        self.get(key)
            .map(|value| serde_json::from_value(value).map_err(GenflowError::from))
            .transpose()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Returns the stored analysis handle.
    pub fn analysis_handle(&self) -> Result<Option<AnalysisHandle>, GenflowError> {
        self.get_as(ANALYSIS_HANDLE_KEY)
    }

    /// Returns the stored external execution identifier.
    pub fn execution_id(&self) -> Result<Option<ExternalExecutionId>, GenflowError> {
        self.get_as(EXECUTION_ID_KEY)
    }
}
