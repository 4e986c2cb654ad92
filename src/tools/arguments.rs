//! Normalization of accumulated argument text and typed access to the result.

use serde_json::{Map, Value};
use thiserror::Error;

use super::capability::HandlerError;

/// Argument text that could not be turned into a JSON object.
///
/// Carries the offending raw text so it can be echoed back in the failed
/// tool message. This never fails a turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid tool arguments ({reason}): {raw}")]
pub struct ArgumentParseError {
    pub raw: String,
    pub reason: String,
}

impl ArgumentParseError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Turn a finalized argument buffer into a JSON object.
///
/// Empty or whitespace-only text, an empty quoted token (`""` or `''`) and a
/// bare `null` all yield `{}`: several backends send one of these for
/// zero-parameter tools. A JSON string whose content is itself an object is
/// unwrapped once. Anything else that is not an object is an error.
pub fn normalize_arguments(raw: &str) -> Result<Map<String, Value>, ArgumentParseError> {
    let trimmed = raw.trim();
    if is_empty_token(trimmed) {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ArgumentParseError::new(raw, e.to_string()))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(inner) => {
            let inner = inner.trim();
            if is_empty_token(inner) {
                return Ok(Map::new());
            }
            match serde_json::from_str::<Value>(inner) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(ArgumentParseError::new(
                    raw,
                    format!("expected a JSON object, got {}", json_type_name(&other)),
                )),
                Err(e) => Err(ArgumentParseError::new(raw, e.to_string())),
            }
        }
        other => Err(ArgumentParseError::new(
            raw,
            format!("expected a JSON object, got {}", json_type_name(&other)),
        )),
    }
}

fn is_empty_token(text: &str) -> bool {
    matches!(text, "" | "\"\"" | "''" | "null")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalized arguments handed to a capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    map: Map<String, Value>,
}

impl ToolArguments {
    pub fn new(map: Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }

    /// The arguments as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.map.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get a required string argument.
    pub fn get_str(&self, key: &str) -> Result<&str, HandlerError> {
        self.map
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::invalid_argument(format!("missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Get a required integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, HandlerError> {
        self.map
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| HandlerError::invalid_argument(format!("missing integer argument: {key}")))
    }

    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.map.get(key).and_then(Value::as_bool)
    }

    /// Deserialize the whole argument object into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.to_value())
            .map_err(|e| HandlerError::invalid_argument(format!("failed to deserialize arguments: {e}")))
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self::new(map)
    }
}
