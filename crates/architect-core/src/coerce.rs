//! Lenient field extraction for generator output.
//!
//! Generators routinely return a bare string where a list was asked for, drop
//! optional keys, or send `null`. These helpers turn such values into the
//! empty/default shape instead of failing the whole record.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SchemaError;

/// Short JSON type name used in error messages
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn as_object<'a>(
    value: &'a Value,
    record: &'static str,
) -> Result<&'a Map<String, Value>, SchemaError> {
    value.as_object().ok_or(SchemaError::NotAnObject {
        record,
        found: kind_of(value),
    })
}

/// Scalar to string; anything else becomes `None`
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a string field, defaulting to the empty string
pub fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(scalar_string).unwrap_or_default()
}

/// Read a list-of-strings field.
///
/// A bare string is wrapped into a single-element list (blank strings yield
/// an empty list). Non-scalar list elements are dropped.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => {
            if s.trim().is_empty() {
                Vec::new()
            } else {
                vec![s.clone()]
            }
        }
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let text = scalar_string(item);
                if text.is_none() {
                    debug!("Dropping non-scalar list element of type {}", kind_of(item));
                }
                text
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(other) => scalar_string(other).into_iter().collect(),
    }
}

/// Read an object field, defaulting to an empty map
pub fn object_field(obj: &Map<String, Value>, key: &str) -> Map<String, Value> {
    obj.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_string_becomes_single_element_list() {
        let value = json!("Use OpenAI embeddings");
        assert_eq!(string_list(Some(&value)), vec!["Use OpenAI embeddings"]);
        assert!(string_list(Some(&json!("   "))).is_empty());
        assert!(string_list(None).is_empty());
        assert!(string_list(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn test_nested_elements_are_dropped() {
        let value = json!(["load docs", {"description": "nested"}, 3, ["x"], null]);
        assert_eq!(string_list(Some(&value)), vec!["load docs", "3"]);
    }

    #[test]
    fn test_as_object_reports_found_type() {
        let err = as_object(&json!([1, 2]), "WorkflowPlan").unwrap_err();
        assert_eq!(
            err,
            SchemaError::NotAnObject {
                record: "WorkflowPlan",
                found: "array"
            }
        );
    }
}
