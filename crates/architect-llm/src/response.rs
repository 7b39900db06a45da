use serde_json::Value;
use thiserror::Error;

/// How many wrapper layers (list, content part, JSON string) are peeled
/// before giving up
const MAX_UNWRAP_DEPTH: usize = 4;

/// What a generation backend hands back before any interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Text(String),
    Structured(Value),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("generator returned an empty response")]
    Empty,

    #[error("generator returned invalid JSON: {source} (near: {snippet})")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        snippet: String,
    },

    #[error("response is nested deeper than {0} wrapper layers")]
    TooDeep(usize),
}

impl RawResponse {
    /// Normalize into a single JSON value.
    ///
    /// Lists are replaced by their first element, content parts of the form
    /// `{"type": "output_text", "text": "..."}` by their text, and strings are
    /// parsed as JSON (markdown fences stripped first). Anything else is
    /// returned as is.
    pub fn decode(self) -> Result<Value, DecodeError> {
        let mut current = match self {
            RawResponse::Text(text) => Value::String(text),
            RawResponse::Structured(value) => value,
        };

        for _ in 0..MAX_UNWRAP_DEPTH {
            current = match current {
                Value::Array(items) => items.into_iter().next().ok_or(DecodeError::Empty)?,
                Value::Object(ref obj) if is_text_part(obj) => {
                    Value::String(obj["text"].as_str().unwrap_or_default().to_string())
                }
                Value::String(text) => parse_json_text(&text)?,
                Value::Null => return Err(DecodeError::Empty),
                other => return Ok(other),
            };
        }

        match current {
            Value::Object(_) | Value::Bool(_) | Value::Number(_) => Ok(current),
            _ => Err(DecodeError::TooDeep(MAX_UNWRAP_DEPTH)),
        }
    }
}

fn is_text_part(obj: &serde_json::Map<String, Value>) -> bool {
    matches!(obj.get("text"), Some(Value::String(_)))
        && obj
            .keys()
            .all(|k| matches!(k.as_str(), "text" | "type" | "annotations"))
}

/// Strip markdown code fences that chat models like to wrap JSON in
pub fn clean_json(input: &str) -> &str {
    let mut text = input.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    text.trim_end_matches("```").trim()
}

fn parse_json_text(text: &str) -> Result<Value, DecodeError> {
    let cleaned = clean_json(text);
    if cleaned.is_empty() {
        return Err(DecodeError::Empty);
    }

    serde_json::from_str(cleaned).map_err(|source| DecodeError::InvalidJson {
        source,
        snippet: cleaned.chars().take(80).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_plain_json_text() {
        let value = RawResponse::Text(r#"{"steps": ["a", "b"]}"#.to_string())
            .decode()
            .unwrap();
        assert_eq!(value["steps"][1], "b");
    }

    #[test]
    fn test_decode_strips_fences() {
        let value = RawResponse::Text("```json\n{\"ok\": true}\n```".to_string())
            .decode()
            .unwrap();
        assert_eq!(value, json!({"ok": true}));

        let value = RawResponse::Text("```JSON\n{\"ok\": true}\n```".to_string())
            .decode()
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(clean_json("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn test_decode_first_content_part() {
        let raw = RawResponse::Structured(json!([
            {"type": "output_text", "text": "{\"use_case\": \"QA\"}", "annotations": []},
            {"type": "output_text", "text": "ignored"}
        ]));
        assert_eq!(raw.decode().unwrap(), json!({"use_case": "QA"}));
    }

    #[test]
    fn test_decode_passes_objects_through() {
        let raw = RawResponse::Structured(json!({"text": "hello", "extra": 1}));
        assert_eq!(raw.decode().unwrap(), json!({"text": "hello", "extra": 1}));
    }

    #[test]
    fn test_decode_json_encoded_string() {
        let inner = serde_json::to_string(&json!({"steps": []})).unwrap();
        let raw = RawResponse::Structured(Value::String(inner));
        assert_eq!(raw.decode().unwrap(), json!({"steps": []}));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            RawResponse::Text("not json at all".to_string()).decode(),
            Err(DecodeError::InvalidJson { .. })
        ));
        assert!(matches!(
            RawResponse::Text("   ".to_string()).decode(),
            Err(DecodeError::Empty)
        ));
        assert!(matches!(
            RawResponse::Structured(json!([])).decode(),
            Err(DecodeError::Empty)
        ));
        assert!(matches!(
            RawResponse::Structured(json!([[[[["x"]]]]])).decode(),
            Err(DecodeError::TooDeep(_))
        ));
    }
}
