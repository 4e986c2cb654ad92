//! Provider formatting helpers.

use serde_json::Value;

/// Convert a capability result into the text fed back to the model.
pub(crate) fn tool_result_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode recorded tool-call arguments for the wire.
///
/// Arguments that failed to parse are stored as the raw text and are sent
/// back verbatim.
pub(crate) fn arguments_to_wire(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
