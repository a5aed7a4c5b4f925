//! Completion actions run after the last step resolves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed post-run action.
///
/// Listeners are not registered at runtime; every pipeline runs exactly
/// `COMPLETION_LISTENERS`, in that order, after its last step resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionListener {
    /// Drops the session's temp resources.
    DropResources,
    /// Removes the run from the job registry.
    Deregister,
}

impl CompletionListener {
    /// Returns the listener name used in logs and events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DropResources => "drop_resources",
            Self::Deregister => "deregister",
        }
    }
}

impl fmt::Display for CompletionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Listeners of every pipeline. Drops precede deregistration so a failed
/// drop is still attributable to a registered run.
pub const COMPLETION_LISTENERS: [CompletionListener; 2] =
    [CompletionListener::DropResources, CompletionListener::Deregister];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_precedes_deregistration() {
        let names: Vec<&str> = COMPLETION_LISTENERS.iter().map(CompletionListener::name).collect();
        assert_eq!(names, vec!["drop_resources", "deregister"]);
        assert_eq!(
            serde_json::to_string(&CompletionListener::DropResources).unwrap(),
            "\"drop_resources\""
        );
    }
}
