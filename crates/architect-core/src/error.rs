use thiserror::Error;

/// Raised when a generated JSON value cannot be coerced into a pipeline record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("expected a JSON object for {record}, got {found}")]
    NotAnObject {
        record: &'static str,
        found: &'static str,
    },

    #[error("missing required field `{field}` in {record}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` in {record} must be {expected}, got {found}")]
    WrongType {
        record: &'static str,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}
