//! Step output type with factory methods.

use super::StepStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of a step execution.
///
/// `StepOutput` is immutable once created and provides factory methods
/// for creating outputs with different statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// The status of the step execution.
    pub status: StepStatus,

    /// The output data (for successful executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Cancel reason (for cancelled executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Default for StepOutput {
    fn default() -> Self {
        Self::ok_empty()
    }
}

impl StepOutput {
    /// Creates a successful output with data.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            status: StepStatus::Ok,
            data: Some(data),
            error: None,
            cancel_reason: None,
        }
    }

    /// Creates a successful output with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            status: StepStatus::Ok,
            data: None,
            error: None,
            cancel_reason: None,
        }
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Cancel,
            data: None,
            error: None,
            cancel_reason: Some(reason.into()),
        }
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Fail,
            data: None,
            error: Some(error.into()),
            cancel_reason: None,
        }
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Ok
    }

    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Fail
    }

    /// Returns true if the step observed cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == StepStatus::Cancel
    }

    /// Gets a value from the output data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    /// Converts the data into a single JSON object, or `None` when empty.
    #[must_use]
    pub fn data_value(&self) -> Option<serde_json::Value> {
        self.data
            .as_ref()
            .map(|d| serde_json::Value::Object(d.clone().into_iter().collect()))
    }
}
