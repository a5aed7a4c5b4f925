//! Execution records written by callbacks and awaited by the pipeline.

use super::ExternalExecutionId;
use crate::errors::GenflowError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle status of an external execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Dispatched, no callback yet.
    #[default]
    Pending,
    /// The service reported success.
    Completed,
    /// The service reported failure, or no callback arrived in time.
    Failed,
    /// The owning run was cancelled.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true for every status except `Pending`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// State of one dispatched external execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Service-issued identifier.
    pub external_execution_id: ExternalExecutionId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Result payload of a completed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error detail of a failed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    fn pending(id: ExternalExecutionId) -> Self {
        Self {
            external_execution_id: id,
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// In-memory store of execution records.
///
/// Each record lives in a `watch` channel so the await step suspends on a
/// change notification instead of polling. A record leaves `Pending` at most
/// once; whichever of callback, timeout or cancellation transitions it first
/// wins, and later transitions are rejected.
#[derive(Debug, Default)]
pub struct ExecutionRecordStore {
    records: DashMap<ExternalExecutionId, watch::Sender<ExecutionRecord>>,
}

impl ExecutionRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending record for a freshly dispatched execution.
    pub fn create(&self, id: &ExternalExecutionId) -> Result<ExecutionRecord, GenflowError> {
        match self.records.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(GenflowError::StateConflict(format!(
                "Execution record '{id}' already exists"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let record = ExecutionRecord::pending(id.clone());
                let (sender, _) = watch::channel(record.clone());
                slot.insert(sender);
                debug!(execution_id = %id, "Created execution record");
                Ok(record)
            }
        }
    }

    /// Returns a snapshot of a record.
    #[must_use]
    pub fn get(&self, id: &ExternalExecutionId) -> Option<ExecutionRecord> {
        self.records.get(id).map(|sender| sender.borrow().clone())
    }

    /// Subscribes to changes of a record.
    #[must_use]
    pub fn subscribe(&self, id: &ExternalExecutionId) -> Option<watch::Receiver<ExecutionRecord>> {
        self.records.get(id).map(|sender| sender.subscribe())
    }

    /// Callback entry point: marks the execution completed with `result`.
    ///
    /// Returns false if the record is unknown or no longer pending.
    pub fn complete(&self, id: &ExternalExecutionId, result: serde_json::Value) -> bool {
        self.transition(id, ExecutionStatus::Completed, |record| {
            record.result = Some(result);
        })
    }

    /// Callback entry point: marks the execution failed.
    ///
    /// Returns false if the record is unknown or no longer pending.
    pub fn fail(&self, id: &ExternalExecutionId, error: impl Into<String>) -> bool {
        let error = error.into();
        self.transition(id, ExecutionStatus::Failed, |record| {
            record.error = Some(error);
        })
    }

    /// Marks the execution cancelled so that late callbacks are discarded.
    pub fn cancel(&self, id: &ExternalExecutionId) -> bool {
        self.transition(id, ExecutionStatus::Cancelled, |_| {})
    }

    /// Removes a record, returning its last state.
    pub fn remove(&self, id: &ExternalExecutionId) -> Option<ExecutionRecord> {
        self.records
            .remove(id)
            .map(|(_, sender)| sender.borrow().clone())
    }

    /// Retires the record of a finished run.
    ///
    /// A record still pending is sealed as cancelled first, waking any
    /// subscriber; the record is then removed so the store only holds
    /// executions of live runs. Callbacks arriving later find no record and
    /// are discarded.
    pub fn retire(&self, id: &ExternalExecutionId) -> Option<ExecutionRecord> {
        self.cancel(id);
        let record = self.remove(id)?;
        debug!(execution_id = %id, status = %record.status, "Retired execution record");
        Some(record)
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn transition<F>(&self, id: &ExternalExecutionId, status: ExecutionStatus, apply: F) -> bool
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        let Some(sender) = self.records.get(id) else {
            warn!(execution_id = %id, %status, "Transition for unknown execution discarded");
            return false;
        };

        let applied = sender.send_if_modified(|record| {
            if record.status.is_terminal() {
                return false;
            }
            record.status = status;
            record.updated_at = Utc::now();
            apply(record);
            true
        });

        if applied {
            debug!(execution_id = %id, %status, "Execution record transitioned");
        } else {
            debug!(execution_id = %id, %status, "Late transition discarded");
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_is_pending() {
        let store = ExecutionRecordStore::new();
        let id = ExternalExecutionId::from("E-42");
        let record = store.create(&id).unwrap();

        assert_eq!(record.status, ExecutionStatus::Pending);
        assert_eq!(store.get(&id).unwrap().status, ExecutionStatus::Pending);
        assert!(store.create(&id).is_err());
    }

    #[test]
    fn test_first_transition_wins() {
        let store = ExecutionRecordStore::new();
        let id = ExternalExecutionId::from("E-42");
        store.create(&id).unwrap();

        assert!(store.complete(&id, json!({"rows": 10})));
        assert!(!store.fail(&id, "late"));
        assert!(!store.cancel(&id));

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.result, Some(json!({"rows": 10})));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_callback_after_cancel_is_discarded() {
        let store = ExecutionRecordStore::new();
        let id = ExternalExecutionId::from("E-1");
        store.create(&id).unwrap();

        assert!(store.cancel(&id));
        assert!(!store.complete(&id, json!({})));
        assert_eq!(store.get(&id).unwrap().status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn test_unknown_record_rejected() {
        let store = ExecutionRecordStore::new();
        assert!(!store.complete(&ExternalExecutionId::from("missing"), json!({})));
        assert!(store.subscribe(&ExternalExecutionId::from("missing")).is_none());
    }

    #[tokio::test]
    async fn test_subscriber_observes_transition() {
        let store = std::sync::Arc::new(ExecutionRecordStore::new());
        let id = ExternalExecutionId::from("E-7");
        store.create(&id).unwrap();
        let mut rx = store.subscribe(&id).unwrap();

        let writer = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.fail(&id, "engine crashed") })
        };

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, ExecutionStatus::Failed);
        assert!(writer.await.unwrap());
    }

    #[test]
    fn test_record_serializes_snake_case_status() {
        let store = ExecutionRecordStore::new();
        let id = ExternalExecutionId::from("E-9");
        store.create(&id).unwrap();
        let value = serde_json::to_value(store.get(&id).unwrap()).unwrap();

        assert_eq!(value["external_execution_id"], "E-9");
        assert_eq!(value["status"], "pending");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_retire_seals_pending_and_removes() {
        let store = ExecutionRecordStore::new();
        let id = ExternalExecutionId::from("E-44");
        store.create(&id).unwrap();
        let rx = store.subscribe(&id).unwrap();

        let retired = store.retire(&id).unwrap();
        assert_eq!(retired.status, ExecutionStatus::Cancelled);
        assert_eq!(rx.borrow().status, ExecutionStatus::Cancelled);
        assert!(store.is_empty());
        assert!(!store.complete(&id, json!({"rows": 1})));
        assert!(store.retire(&id).is_none());
    }

    #[test]
    fn test_retire_keeps_terminal_status() {
        let store = ExecutionRecordStore::new();
        let id = ExternalExecutionId::from("E-45");
        store.create(&id).unwrap();
        store.complete(&id, json!({"rows": 10}));

        let retired = store.retire(&id).unwrap();
        assert_eq!(retired.status, ExecutionStatus::Completed);
        assert_eq!(retired.result, Some(json!({"rows": 10})));
    }
}
