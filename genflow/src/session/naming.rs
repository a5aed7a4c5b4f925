//! Pure naming functions for session-scoped temporary resources.

use super::SessionId;

/// Purpose tag of the cohort table every cohort-based run creates.
pub const COHORT_PURPOSE: &str = "cohort";

/// Prefix of the temporary cohort table, kept for collaborators that match on it.
pub const TEMP_COHORT_TABLE_PREFIX: &str = "temp_cohort_";

/// Derives the name of a temporary resource from its session and purpose.
///
/// Purpose tags keep only their ASCII alphanumerics, lowercased. The first `_`
/// after `temp_` therefore always ends the purpose, and different sessions
/// can never map to the same name.
#[must_use]
pub fn temp_resource_name(session_id: &SessionId, purpose: &str) -> String {
    let purpose: String = purpose
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("temp_{purpose}_{session_id}")
}

/// Returns the session's temporary cohort table name.
#[must_use]
pub fn temp_table_name(session_id: &SessionId) -> String {
    temp_resource_name(session_id, COHORT_PURPOSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohort_name_is_stable() {
        let id = SessionId::from("S1");
        let first = temp_resource_name(&id, "cohort");
        let second = temp_resource_name(&id, "cohort");

        assert_eq!(first, "temp_cohort_S1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_temp_table_name_uses_cohort_prefix() {
        let id = SessionId::from("abc");
        assert_eq!(temp_table_name(&id), format!("{TEMP_COHORT_TABLE_PREFIX}abc"));
    }

    #[test]
    fn test_purpose_is_normalized() {
        let id = SessionId::from("S1");
        assert_eq!(temp_resource_name(&id, "Inclusion Stats"), "temp_inclusionstats_S1");
    }

    #[test]
    fn test_distinct_sessions_distinct_names() {
        let a = temp_table_name(&SessionId::from("A"));
        let b = temp_table_name(&SessionId::from("B"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_underscores_cannot_shift_between_purpose_and_session() {
        let a = temp_resource_name(&SessionId::from("x_y"), "a");
        let b = temp_resource_name(&SessionId::from("y"), "a_x");
        assert_eq!(a, "temp_a_x_y");
        assert_eq!(b, "temp_ax_y");
        assert_ne!(a, b);
    }
}
