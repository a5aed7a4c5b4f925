//! Job parameters attached to every assembled pipeline.

use crate::session::{temp_table_name, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Parameter holding the session identifier.
pub const SESSION_ID_PARAM: &str = "session_id";

/// Parameter holding the session's temp cohort table name.
pub const TARGET_TABLE_PARAM: &str = "target_table";

/// Ordered string parameters of one job.
///
/// Always contains `session_id` and `target_table`; those two keys cannot be
/// overwritten by caller-supplied parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters(BTreeMap<String, String>);

impl JobParameters {
    /// Creates the session parameters for `session_id`.
    #[must_use]
    pub fn for_session(session_id: &SessionId) -> Self {
        let mut params = BTreeMap::new();
        params.insert(SESSION_ID_PARAM.to_string(), session_id.to_string());
        params.insert(TARGET_TABLE_PARAM.to_string(), temp_table_name(session_id));
        Self(params)
    }

    /// Adds a caller parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key == SESSION_ID_PARAM || key == TARGET_TABLE_PARAM {
            warn!(key = %key, "Ignoring attempt to override a session parameter");
            return self;
        }
        self.0.insert(key, value.into());
        self
    }

    /// Gets a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the session identifier parameter.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.get(SESSION_ID_PARAM)
    }

    /// Returns the temp cohort table parameter.
    #[must_use]
    pub fn target_table(&self) -> Option<&str> {
        self.get(TARGET_TABLE_PARAM)
    }

    /// Iterates parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_parameters_present() {
        let params = JobParameters::for_session(&SessionId::from("S1"));
        assert_eq!(params.session_id(), Some("S1"));
        assert_eq!(params.target_table(), Some("temp_cohort_S1"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_session_parameters_not_overridden() {
        let params = JobParameters::for_session(&SessionId::from("S1"))
            .with("target_table", "elsewhere")
            .with("cdm_schema", "cdm");

        assert_eq!(params.target_table(), Some("temp_cohort_S1"));
        assert_eq!(params.get("cdm_schema"), Some("cdm"));
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["cdm_schema", "session_id", "target_table"]);
    }
}
