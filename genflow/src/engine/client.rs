//! Client interface of the external execution service.

use crate::errors::GenflowError;
use crate::source::TargetSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// One file of an analysis package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFile {
    /// File name inside the package.
    pub file_name: String,
    /// Raw contents.
    pub contents: Vec<u8>,
}

impl AnalysisFile {
    /// Creates a new analysis file.
    #[must_use]
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// Handle of an analysis registered with the external service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisHandle(String);

impl AnalysisHandle {
    /// Wraps a service-issued handle.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the external service assigns to a dispatched execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalExecutionId(String);

impl ExternalExecutionId {
    /// Wraps a service-issued identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ExternalExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Client of the external execution service.
///
/// Completion is not reported through this trait: the service's callback
/// transport writes into an `ExecutionRecordStore`.
#[async_trait]
pub trait ExecutionEngineClient: Send + Sync + Debug {
    /// Registers the analysis files and returns the service's handle.
    async fn create_analysis(
        &self,
        source: &TargetSource,
        files: &[AnalysisFile],
    ) -> Result<AnalysisHandle, GenflowError>;

    /// Submits a registered analysis for execution against `source`.
    ///
    /// Returns as soon as the service accepted the submission.
    async fn dispatch(
        &self,
        handle: &AnalysisHandle,
        source: &TargetSource,
    ) -> Result<ExternalExecutionId, GenflowError>;
}
