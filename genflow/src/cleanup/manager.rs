//! Session-scoped temp resource registry with idempotent, best-effort teardown.

use crate::errors::CleanupWarning;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::session::{temp_resource_name, SessionId};
use crate::source::{Dialect, SourceConnection, StatementRenderer, TargetSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A temporary object created on the target source during a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempResource {
    /// Owning session.
    pub session_id: SessionId,
    /// Unqualified object name.
    pub name: String,
    /// Dialect the object was created with.
    pub dialect: Dialect,
}

/// Tracks temp resources per session on one target source and drops them.
///
/// Drops are issued outside of any step transaction, so a rolled-back step
/// never rolls back or blocks its own cleanup.
pub struct TempResourceCleanupManager {
    source: TargetSource,
    connection: Arc<dyn SourceConnection>,
    renderer: Arc<dyn StatementRenderer>,
    events: Arc<dyn EventSink>,
    timeout: Duration,
    registry: Mutex<HashMap<SessionId, Vec<TempResource>>>,
}

impl TempResourceCleanupManager {
    /// Creates a manager for `source`.
    #[must_use]
    pub fn new(
        source: TargetSource,
        connection: Arc<dyn SourceConnection>,
        renderer: Arc<dyn StatementRenderer>,
    ) -> Self {
        Self {
            source,
            connection,
            renderer,
            events: Arc::new(NoOpEventSink),
            timeout: Duration::from_secs(30),
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the total time budget of one cleanup pass.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the audit sink that receives cleanup warnings.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the managed target source.
    #[must_use]
    pub fn source(&self) -> &TargetSource {
        &self.source
    }

    /// Registers a resource for later teardown.
    ///
    /// Registering the same name twice for a session is a no-op.
    pub fn register(&self, session_id: &SessionId, resource_name: impl Into<String>, dialect: Dialect) {
        let name = resource_name.into();
        let mut registry = self.registry.lock();
        let entries = registry.entry(session_id.clone()).or_default();

        if entries.iter().any(|r| r.name == name) {
            return;
        }

        debug!(session_id = %session_id, resource = %name, "Registered temp resource");
        entries.push(TempResource {
            session_id: session_id.clone(),
            name,
            dialect,
        });
    }

    /// Re-registers the derived names of `purposes` for a session.
    ///
    /// Used when the registry was lost; the names are recomputed from the
    /// session identifier alone.
    pub fn recover(&self, session_id: &SessionId, purposes: &[&str]) {
        for purpose in purposes {
            self.register(
                session_id,
                temp_resource_name(session_id, purpose),
                self.source.dialect.clone(),
            );
        }
    }

    /// Returns the resources currently pending teardown for a session.
    #[must_use]
    pub fn pending(&self, session_id: &SessionId) -> Vec<TempResource> {
        self.registry
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops every resource registered for the session, in reverse order.
    ///
    /// Idempotent: entries are consumed by the first call, so repeated calls
    /// and calls for sessions with nothing registered succeed without issuing
    /// statements. Each drop gets a share of the total timeout. Failed drops
    /// are reported as a `CleanupWarning` and are not retried.
    ///
    /// Returns the number of resources dropped.
    pub async fn cleanup(&self, session_id: &SessionId) -> Result<usize, CleanupWarning> {
        let entries = self.registry.lock().remove(session_id).unwrap_or_default();

        if entries.is_empty() {
            debug!(session_id = %session_id, "No temp resources to clean up");
            return Ok(0);
        }

        #[allow(clippy::cast_precision_loss)]
        let per_resource = Duration::from_secs_f64(
            (self.timeout.as_secs_f64() / entries.len() as f64).max(0.01),
        );
        let mut dropped = 0;
        let mut failures = Vec::new();

        for resource in entries.into_iter().rev() {
            let qualified = self.source.qualify(&resource.name);
            let statement = self.renderer.drop_table(&resource.dialect, &qualified);

            match tokio::time::timeout(per_resource, self.connection.execute(&statement)).await {
                Ok(Ok(_)) => {
                    dropped += 1;
                }
                Ok(Err(e)) => {
                    failures.push((qualified, e.to_string()));
                }
                Err(_) => {
                    failures.push((qualified, "Drop timed out".to_string()));
                }
            }
        }

        if failures.is_empty() {
            info!(session_id = %session_id, dropped, "Cleaned up temp resources");
            return Ok(dropped);
        }

        let warning = CleanupWarning::new(session_id.as_str(), failures);
        warn!(session_id = %session_id, "{}", warning);
        self.events.try_emit(
            events::CLEANUP_WARNING,
            Some(serde_json::json!({
                "session_id": session_id,
                "source_key": self.source.source_key,
                "failures": warning
                    .failures
                    .iter()
                    .map(|(name, msg)| serde_json::json!({"resource": name, "error": msg}))
                    .collect::<Vec<_>>(),
            })),
        );
        Err(warning)
    }
}

impl std::fmt::Debug for TempResourceCleanupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempResourceCleanupManager")
            .field("source", &self.source.source_key)
            .field("sessions", &self.registry.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::source::DefaultRenderer;
    use crate::testing::RecordingConnection;

    fn manager(connection: Arc<RecordingConnection>) -> TempResourceCleanupManager {
        TempResourceCleanupManager::new(
            TargetSource::new("synpuf", "pg", "conn"),
            connection,
            Arc::new(DefaultRenderer),
        )
    }

    #[tokio::test]
    async fn test_cleanup_drops_in_reverse_order() {
        let connection = Arc::new(RecordingConnection::new());
        let manager = manager(connection.clone());
        let session = SessionId::from("S1");

        manager.register(&session, "temp_cohort_S1", Dialect::PostgreSql);
        manager.register(&session, "temp_stats_S1", Dialect::PostgreSql);

        assert_eq!(manager.cleanup(&session).await.unwrap(), 2);
        assert_eq!(
            connection.statements(),
            vec![
                "DROP TABLE IF EXISTS temp_stats_S1".to_string(),
                "DROP TABLE IF EXISTS temp_cohort_S1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let connection = Arc::new(RecordingConnection::new());
        let manager = manager(connection.clone());
        let session = SessionId::from("S1");
        manager.register(&session, "temp_cohort_S1", Dialect::PostgreSql);

        assert_eq!(manager.cleanup(&session).await.unwrap(), 1);
        for _ in 0..3 {
            assert_eq!(manager.cleanup(&session).await.unwrap(), 0);
        }
        assert_eq!(connection.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_without_registrations_is_noop() {
        let connection = Arc::new(RecordingConnection::new());
        let manager = manager(connection.clone());

        assert_eq!(manager.cleanup(&SessionId::from("nobody")).await.unwrap(), 0);
        assert!(connection.statements().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_ignored() {
        let connection = Arc::new(RecordingConnection::new());
        let manager = manager(connection.clone());
        let session = SessionId::from("S1");

        manager.register(&session, "temp_cohort_S1", Dialect::PostgreSql);
        manager.register(&session, "temp_cohort_S1", Dialect::PostgreSql);
        assert_eq!(manager.pending(&session).len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let connection = Arc::new(RecordingConnection::new());
        let manager = manager(connection.clone());
        let a = SessionId::from("A");
        let b = SessionId::from("B");
        manager.register(&a, "temp_cohort_A", Dialect::PostgreSql);
        manager.register(&b, "temp_cohort_B", Dialect::PostgreSql);

        manager.cleanup(&a).await.unwrap();

        assert!(manager.pending(&a).is_empty());
        assert_eq!(manager.pending(&b).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_drop_is_a_warning_and_not_retried() {
        let connection = Arc::new(RecordingConnection::new());
        connection.fail_statements_containing("temp_cohort_S1");
        let sink = Arc::new(CollectingEventSink::new());
        let manager = manager(connection.clone()).with_event_sink(sink.clone());
        let session = SessionId::from("S1");
        manager.register(&session, "temp_cohort_S1", Dialect::PostgreSql);

        let warning = manager.cleanup(&session).await.unwrap_err();
        assert_eq!(warning.session_id, "S1");
        assert_eq!(warning.failures.len(), 1);
        assert_eq!(sink.events_of_type(events::CLEANUP_WARNING).len(), 1);

        // Entries are consumed once; a repeat call does not escalate.
        assert_eq!(manager.cleanup(&session).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recover_uses_derived_names() {
        let connection = Arc::new(RecordingConnection::new());
        let manager = TempResourceCleanupManager::new(
            TargetSource::new("synpuf", "pg", "conn").with_temp_qualifier("scratch"),
            connection.clone(),
            Arc::new(DefaultRenderer),
        );
        let session = SessionId::from("S1");

        manager.recover(&session, &[crate::session::COHORT_PURPOSE]);
        manager.cleanup(&session).await.unwrap();

        assert_eq!(
            connection.statements(),
            vec!["DROP TABLE IF EXISTS scratch.temp_cohort_S1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_slow_drop_times_out() {
        let connection = Arc::new(RecordingConnection::new().with_delay(Duration::from_secs(5)));
        let manager = manager(connection).with_timeout(Duration::from_millis(20));
        let session = SessionId::from("S1");
        manager.register(&session, "temp_cohort_S1", Dialect::PostgreSql);

        let warning = manager.cleanup(&session).await.unwrap_err();
        assert_eq!(warning.failures[0].1, "Drop timed out");
    }
}
