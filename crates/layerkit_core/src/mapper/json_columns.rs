//! JSON column text codec.
//!
//! Encoding turns structured values into JSON text before a write. Decoding
//! is lenient: only text that looks like a JSON object or array is parsed,
//! and text that fails to parse is kept as-is so legacy non-JSON content
//! survives a read.

use serde_json::{Map, Value};

/// Serializes one column value. Strings are assumed to already be in text
/// form and are passed through.
pub(crate) fn encode_value(value: &Value, force_object: bool) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other if force_object => Value::String(force_object_shape(other).to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Parses stored text when it starts with `{` or `[`; anything else, or
/// text that is not valid JSON, is returned unchanged.
pub(crate) fn decode_value(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    if !(text.starts_with('{') || text.starts_with('[')) {
        return value;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(parsed) => parsed,
        Err(_) => value,
    }
}

/// Rewrites arrays as objects keyed by position, recursively.
fn force_object_shape(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Object(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), force_object_shape(item)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), force_object_shape(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}
