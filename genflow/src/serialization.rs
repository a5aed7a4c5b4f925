//! Canonical serialization of analysis definitions for audit and storage.
//!
//! Output is stable: object keys are sorted at every depth, so the same
//! definition always serializes to the same string. Only fields the type
//! exposes through `Serialize` are written. Reading ignores fields the target
//! type does not declare.

use crate::errors::GenflowError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Serializes `analysis` to canonical JSON.
pub fn serialize_analysis<T: Serialize>(analysis: &T) -> Result<String, GenflowError> {
    let value = serde_json::to_value(analysis)?;
    Ok(serde_json::to_string(&canonicalize(value))?)
}

/// Deserializes an analysis definition, ignoring unknown fields.
///
/// An empty input document is read as `{}`.
pub fn deserialize_analysis<T: DeserializeOwned>(input: &str) -> Result<T, GenflowError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(serde_json::from_value(Value::Object(serde_json::Map::new()))?);
    }
    Ok(serde_json::from_str(input)?)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::steps::CohortDefinition;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Characterization {
        name: String,
        cohort_ids: Vec<i64>,
        settings: HashMap<String, Value>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Empty {}

    #[test]
    fn test_keys_are_sorted_at_every_depth() {
        let analysis = serde_json::json!({
            "zeta": 1,
            "alpha": {"min_age": 18, "covariates": [{"window": 30, "domain": "drug"}]},
        });
        assert_eq!(
            serialize_analysis(&analysis).unwrap(),
            r#"{"alpha":{"covariates":[{"domain":"drug","window":30}],"min_age":18},"zeta":1}"#
        );
    }

    #[test]
    fn test_serialization_is_stable_for_maps() {
        let mut settings = HashMap::new();
        for key in ["timeAtRisk", "age", "washout", "gender"] {
            settings.insert(key.to_string(), Value::Bool(true));
        }
        let analysis = Characterization {
            name: "baseline".into(),
            cohort_ids: vec![3, 1],
            settings,
        };
        let first = serialize_analysis(&analysis).unwrap();
        assert_eq!(serialize_analysis(&analysis).unwrap(), first);
        assert!(first.contains(r#""settings":{"age":true,"gender":true,"timeAtRisk":true,"washout":true}"#));
        assert!(first.contains(r#""cohort_ids":[3,1]"#));
    }

    #[test]
    fn test_empty_struct_serializes() {
        assert_eq!(serialize_analysis(&Empty {}).unwrap(), "{}");
        let _: Empty = deserialize_analysis("").unwrap();
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let parsed: CohortDefinition = deserialize_analysis(
            r#"{"id": 7, "name": "target", "expression_sql": "SELECT 1", "createdBy": "admin"}"#,
        )
        .unwrap();
        assert_eq!(parsed.id, 7);

        let parsed: Characterization = deserialize_analysis(r#"{"name": "x", "extra": [1]}"#).unwrap();
        assert_eq!(parsed.name, "x");
        assert!(parsed.cohort_ids.is_empty());
    }

    #[test]
    fn test_malformed_input_is_a_serialization_error() {
        let err = deserialize_analysis::<Characterization>("{not json").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Serialization);
    }
}
