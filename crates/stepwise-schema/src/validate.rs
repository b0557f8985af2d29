//! Structural validation through JSON Schema.
//!
//! A `Schema` is compiled to a JSON Schema document and checked with the
//! `jsonschema` crate. All violations are collected so the caller (and the
//! model reading the retry prompt) sees the full failure set in one pass.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::schema::{Schema, SchemaError, SchemaKind};

impl Schema {
    /// Compile this node into a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        let mut doc = match &self.kind {
            SchemaKind::Object {
                properties,
                additional_properties,
            } => {
                let mut props = Map::new();
                let mut required = Vec::new();
                for p in properties {
                    props.insert(p.name.clone(), p.schema.to_json_schema());
                    if p.required {
                        required.push(Value::String(p.name.clone()));
                    }
                }
                let mut obj = json!({ "type": "object", "properties": props });
                if !required.is_empty() {
                    obj["required"] = Value::Array(required);
                }
                if !additional_properties {
                    obj["additionalProperties"] = Value::Bool(false);
                }
                obj
            }
            SchemaKind::Array(items) => json!({ "type": "array", "items": items.to_json_schema() }),
            SchemaKind::String => json!({ "type": "string" }),
            SchemaKind::Number => json!({ "type": "number" }),
            SchemaKind::Integer => json!({ "type": "integer" }),
            SchemaKind::Boolean => json!({ "type": "boolean" }),
            SchemaKind::Null => json!({ "type": "null" }),
            SchemaKind::Literal(value) => json!({ "const": value }),
            SchemaKind::Union(members) => {
                json!({ "anyOf": members.iter().map(Schema::to_json_schema).collect::<Vec<_>>() })
            }
            SchemaKind::Enum(values) => json!({ "enum": values }),
            SchemaKind::Any | SchemaKind::Unknown => json!({}),
        };

        if let Value::Object(map) = &mut doc {
            if let Some(description) = &self.description {
                map.insert("description".to_string(), Value::String(description.clone()));
            }
            if let Some(default) = &self.default {
                map.insert("default".to_string(), default.clone());
            }
        }
        doc
    }

    /// Check `instance` against this schema.
    ///
    /// Returns `SchemaError::Invalid` listing every violation, formatted as
    /// `"JSON Schema violation at {path}: {error}"`.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaError> {
        let document = self.to_json_schema();
        let validator =
            jsonschema::validator_for(&document).map_err(|e| SchemaError::Malformed {
                reason: e.to_string(),
            })?;

        let violations: Vec<String> = validator
            .iter_errors(instance)
            .map(|error| format!("JSON Schema violation at {}: {}", error.instance_path, error))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            debug!(count = violations.len(), "instance rejected by schema");
            Err(SchemaError::Invalid { violations })
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validate(instance).is_ok()
    }
}
