//! Session allocation and deterministic temporary-resource naming.
//!
//! A session is the isolation unit for one pipeline run. Every temporary
//! object a run creates is named from its session identifier, so concurrent
//! runs against the same source never collide and cleanup can be computed
//! from the identifier alone.

mod naming;

pub use naming::{
    temp_resource_name, temp_table_name, COHORT_PURPOSE, TEMP_COHORT_TABLE_PREFIX,
};

use crate::errors::{GenflowError, PipelineValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, process-wide unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identifier.
    ///
    /// The simple (hyphen-free) UUID form keeps derived names valid SQL identifiers.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Checks that the identifier is usable inside an unquoted SQL identifier:
    /// non-empty ASCII letters, digits and underscores.
    pub fn validate(&self) -> Result<(), GenflowError> {
        if self.0.is_empty()
            || !self.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PipelineValidationError::new(format!(
                "Session id '{}' must be non-empty and contain only ASCII letters, digits or '_'",
                self.0
            ))
            .into());
        }
        Ok(())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A session owned by exactly one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The session identifier.
    pub id: SessionId,
    /// When the session was allocated.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session with an explicit identifier.
    #[must_use]
    pub fn with_id(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }

    /// Returns the name of this session's temporary resource for `purpose`.
    #[must_use]
    pub fn temp_resource_name(&self, purpose: &str) -> String {
        temp_resource_name(&self.id, purpose)
    }

    /// Returns the name of this session's temporary cohort table.
    #[must_use]
    pub fn temp_table_name(&self) -> String {
        temp_table_name(&self.id)
    }
}

/// Allocates a new session.
#[must_use]
pub fn new_session() -> Session {
    Session {
        id: SessionId::generate(),
        created_at: Utc::now(),
    }
}
