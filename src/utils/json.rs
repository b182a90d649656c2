use serde_json::{Map, Value};

/// How a single key of a partial-update body was supplied.
#[derive(Debug, PartialEq, Eq)]
pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(body: &Map<String, Value>, field: &str) -> Result<NullableValue, String> {
    match body.get(field) {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("{field} must be a string or null, got {other}")),
    }
}
