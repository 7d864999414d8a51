//! JSON Output Formatting

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use litegate_client::{Row, Value};
use serde::Serialize;

/// Format data as pretty JSON
pub fn format_json_pretty<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Format data as compact JSON (one line)
pub fn format_json_compact<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Converts a value to JSON; byte strings become base64 text
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        // Non-finite floats have no JSON form and become null
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
        Value::Sequence(items) => items.iter().map(value_to_json).collect(),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Format result rows as a JSON array of objects
pub fn format_rows_json(rows: &[Row], pretty: bool) -> Result<String, serde_json::Error> {
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| value_to_json(&Value::Map(row.clone())))
        .collect();

    if pretty {
        format_json_pretty(&data)
    } else {
        format_json_compact(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_formatting() {
        let rows = vec![Row::new()
            .with("id", 1)
            .with("blob", Value::Bytes(b"hi".to_vec()))
            .with("ratio", 0.5)];

        let pretty = format_rows_json(&rows, true).unwrap();
        assert!(pretty.contains('\n')); // Pretty has newlines

        let compact = format_rows_json(&rows, false).unwrap();
        assert!(!compact.contains('\n')); // Compact is one line
        assert!(compact.contains("\"blob\":\"aGk=\""), "{compact}");
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert_eq!(
            value_to_json(&Value::Float(f64::NAN)),
            serde_json::Value::Null
        );
    }
}
