//! Capability parameter schemas and the tool definitions sent to providers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Tool schema as advertised to a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object.
    pub parameters: Value,
}

/// JSON Schema describing a capability's arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityParameters {
    pub schema: Value,
}

impl CapabilityParameters {
    pub fn from_schema(schema: Value) -> Self {
        Self { schema }
    }

    /// A capability that takes no arguments.
    pub fn empty() -> Self {
        Self::object().build()
    }

    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for object-shaped parameter schemas.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({ "type": "string", "description": description }), required)
    }

    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({ "type": "integer", "description": description }), required)
    }

    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({ "type": "boolean", "description": description }), required)
    }

    pub fn string_enum(self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.property(
            name,
            json!({ "type": "string", "description": description, "enum": values }),
            required,
        )
    }

    /// Add an arbitrary property schema.
    pub fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn build(self) -> CapabilityParameters {
        CapabilityParameters {
            schema: json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_tracks_required_properties() {
        let params = CapabilityParameters::object()
            .string("title", "Item title", true)
            .integer("position", "Zero-based position", false)
            .string_enum("kind", "Item kind", &["chapter", "scene"], true)
            .build();
        assert_eq!(params.schema["required"], json!(["title", "kind"]));
        assert_eq!(params.schema["properties"]["position"]["type"], "integer");
        assert_eq!(params.schema["properties"]["kind"]["enum"], json!(["chapter", "scene"]));
    }

    #[test]
    fn empty_schema_is_an_object_without_properties() {
        let params = CapabilityParameters::empty();
        assert_eq!(params.schema["type"], "object");
        assert_eq!(params.schema["properties"], json!({}));
    }
}
