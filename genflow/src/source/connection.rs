//! Target source identity and the statement execution seam.

use super::Dialect;
use crate::errors::GenflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Immutable reference to the data source a run operates against.
///
/// Supplied by the caller; the pipeline never owns the source itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSource {
    /// Logical key of the source.
    pub source_key: String,
    /// SQL dialect of the source.
    pub dialect: Dialect,
    /// Key used by the connection provider to reach the source.
    pub connection_key: String,
    /// Schema where temporary objects are created, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_qualifier: Option<String>,
}

impl TargetSource {
    /// Creates a new target source.
    #[must_use]
    pub fn new(
        source_key: impl Into<String>,
        dialect: impl Into<Dialect>,
        connection_key: impl Into<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            dialect: dialect.into(),
            connection_key: connection_key.into(),
            temp_qualifier: None,
        }
    }

    /// Sets the temp schema.
    #[must_use]
    pub fn with_temp_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.temp_qualifier = Some(qualifier.into());
        self
    }

    /// Qualifies a temporary object name with the temp schema.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        match self.temp_qualifier.as_deref() {
            Some(q) if !q.is_empty() => format!("{q}.{name}"),
            _ => name.to_string(),
        }
    }
}

/// Dialect-aware statement execution against one target source.
///
/// Connectivity and statement failures are reported as
/// `GenflowError::TransientSource`.
#[async_trait]
pub trait SourceConnection: Send + Sync + Debug {
    /// Executes a single statement outside of any transaction.
    ///
    /// Returns the number of affected rows, if the driver reports it.
    async fn execute(&self, statement: &str) -> Result<u64, GenflowError>;

    /// Executes statements inside one transaction, rolling back on the first failure.
    async fn execute_in_transaction(&self, statements: &[String]) -> Result<u64, GenflowError>;
}

/// Resolves connections for target sources.
pub trait ConnectionProvider: Send + Sync {
    /// Returns a connection for `source`.
    fn connection(&self, source: &TargetSource) -> Result<Arc<dyn SourceConnection>, GenflowError>;
}
