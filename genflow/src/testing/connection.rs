//! In-memory source connection that records what it was asked to run.

use crate::errors::GenflowError;
use crate::source::{ConnectionProvider, SourceConnection, TargetSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source connection that records statements instead of running them.
///
/// Transactions are all-or-nothing: if any statement matches a failure
/// pattern, none of the transaction's statements is recorded.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    statements: Mutex<Vec<String>>,
    standalone: Mutex<Vec<String>>,
    transactions: Mutex<Vec<Vec<String>>>,
    failing_patterns: Mutex<Vec<String>>,
    transient_failures: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingConnection {
    /// Creates a new recording connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every statement containing `pattern`.
    pub fn fail_statements_containing(&self, pattern: impl Into<String>) {
        self.failing_patterns.lock().push(pattern.into());
    }

    /// Fails the next `count` calls with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Returns every successfully executed statement, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Returns the statements executed outside of any transaction.
    #[must_use]
    pub fn standalone_statements(&self) -> Vec<String> {
        self.standalone.lock().clone()
    }

    /// Returns every committed transaction.
    #[must_use]
    pub fn transactions(&self) -> Vec<Vec<String>> {
        self.transactions.lock().clone()
    }

    /// Returns how many executed statements contain `pattern`.
    #[must_use]
    pub fn count_containing(&self, pattern: &str) -> usize {
        self.statements
            .lock()
            .iter()
            .filter(|s| s.contains(pattern))
            .count()
    }

    async fn check(&self, statements: &[String]) -> Result<(), GenflowError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let injected = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GenflowError::transient("recording", "Injected connection reset"));
        }

        let patterns = self.failing_patterns.lock();
        if let Some(statement) = statements
            .iter()
            .find(|s| patterns.iter().any(|p| s.contains(p.as_str())))
        {
            return Err(GenflowError::transient(
                "recording",
                format!("Statement rejected: {statement}"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceConnection for RecordingConnection {
    async fn execute(&self, statement: &str) -> Result<u64, GenflowError> {
        self.check(&[statement.to_string()]).await?;
        self.statements.lock().push(statement.to_string());
        self.standalone.lock().push(statement.to_string());
        Ok(1)
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> Result<u64, GenflowError> {
        self.check(statements).await?;
        self.statements.lock().extend(statements.iter().cloned());
        self.transactions.lock().push(statements.to_vec());
        Ok(statements.len() as u64)
    }
}

/// Hands out the same connection for every target source.
#[derive(Debug, Clone)]
pub struct SingleConnectionProvider {
    connection: Arc<dyn SourceConnection>,
}

impl SingleConnectionProvider {
    /// Creates a provider for `connection`.
    #[must_use]
    pub fn new(connection: Arc<dyn SourceConnection>) -> Self {
        Self { connection }
    }
}

impl ConnectionProvider for SingleConnectionProvider {
    fn connection(&self, _source: &TargetSource) -> Result<Arc<dyn SourceConnection>, GenflowError> {
        Ok(self.connection.clone())
    }
}
