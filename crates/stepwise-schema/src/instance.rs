//! Conversions between schemas and concrete JSON instances.

use serde_json::{Map, Value};

use crate::schema::{Property, Schema, SchemaError, SchemaKind};

impl Schema {
    /// Produce a minimal representative value for this shape.
    ///
    /// An explicit `default` always wins. Otherwise strings are empty,
    /// numbers zero, booleans false, unions take their first arm, arrays hold
    /// one default item, and objects carry every declared property.
    pub fn default_instance(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match &self.kind {
            SchemaKind::Object { properties, .. } => {
                let mut obj = Map::new();
                for p in properties {
                    obj.insert(p.name.clone(), p.schema.default_instance());
                }
                Value::Object(obj)
            }
            SchemaKind::Array(items) => Value::Array(vec![items.default_instance()]),
            SchemaKind::String => Value::String(String::new()),
            SchemaKind::Number | SchemaKind::Integer => Value::from(0),
            SchemaKind::Boolean => Value::Bool(false),
            SchemaKind::Literal(value) => value.clone(),
            SchemaKind::Union(members) => members
                .first()
                .map(Schema::default_instance)
                .unwrap_or(Value::Null),
            SchemaKind::Enum(values) => values.first().cloned().unwrap_or(Value::Null),
            SchemaKind::Null | SchemaKind::Any | SchemaKind::Unknown => Value::Null,
        }
    }

    /// Infer a schema from an example instance.
    ///
    /// Objects become closed objects with every key required. Arrays must be
    /// non-empty and hold items of one JSON kind; the first item defines the
    /// item schema.
    pub fn from_instance(instance: &Value) -> Result<Schema, SchemaError> {
        match instance {
            Value::Null => Ok(Schema::null()),
            Value::Bool(_) => Ok(Schema::boolean()),
            Value::Number(_) => Ok(Schema::number()),
            Value::String(_) => Ok(Schema::string()),
            Value::Array(items) => {
                let first = items.first().ok_or(SchemaError::EmptyArray)?;
                let first_kind = json_kind(first);
                if items.iter().any(|item| json_kind(item) != first_kind) {
                    let kinds: Vec<&str> = items.iter().map(json_kind).collect();
                    return Err(SchemaError::MixedArray {
                        kinds: kinds.join(", "),
                    });
                }
                Ok(Schema::array(Schema::from_instance(first)?))
            }
            Value::Object(map) => {
                let properties = map
                    .iter()
                    .map(|(key, value)| -> Result<Property, SchemaError> {
                        Ok(Property::required(key.clone(), Schema::from_instance(value)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Schema::object(properties).closed())
            }
        }
    }

    /// Import a JSON Schema document.
    ///
    /// Supports objects (with `required` and boolean `additionalProperties`),
    /// arrays, strings (an `enum` becomes a union of literals), numbers,
    /// integers, and booleans. Anything else imports as `Any`.
    pub fn from_json_schema(document: &Value) -> Schema {
        let description = document
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let schema = match document.get("type").and_then(Value::as_str) {
            Some("object") => {
                let required: Vec<&str> = document
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| r.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let properties = document
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| {
                        props
                            .iter()
                            .map(|(key, value)| Property {
                                name: key.clone(),
                                schema: Schema::from_json_schema(value),
                                required: required.contains(&key.as_str()),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let additional_properties = document
                    .get("additionalProperties")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                Schema::new(SchemaKind::Object {
                    properties,
                    additional_properties,
                })
            }
            Some("array") => match document.get("items") {
                Some(items) => Schema::array(Schema::from_json_schema(items)),
                None => Schema::array(Schema::any()),
            },
            Some("string") => match document.get("enum").and_then(Value::as_array) {
                Some(values) => Schema::union(values.iter().cloned().map(Schema::literal).collect()),
                None => Schema::string(),
            },
            Some("number") | Some("integer") => Schema::number(),
            Some("boolean") => Schema::boolean(),
            _ => Schema::any(),
        };

        Schema {
            description,
            ..schema
        }
    }

    /// Make every property of an object schema accept `null`.
    ///
    /// Non-object schemas are returned unchanged.
    pub fn with_nullable_fields(&self) -> Schema {
        match &self.kind {
            SchemaKind::Object { properties, .. } => {
                let properties = properties
                    .iter()
                    .map(|p| Property {
                        name: p.name.clone(),
                        schema: Schema::union(vec![p.schema.clone(), Schema::null()]),
                        required: p.required,
                    })
                    .collect();
                Schema {
                    kind: SchemaKind::Object {
                        properties,
                        additional_properties: false,
                    },
                    description: self.description.clone(),
                    default: None,
                }
            }
            _ => self.clone(),
        }
    }

    /// Visit every primitive node with its dotted path (`.user.name`).
    ///
    /// Array items share their array's path.
    pub fn walk_primitives<F>(&self, visit: &mut F)
    where
        F: FnMut(&Schema, &str),
    {
        self.walk_at("", visit);
    }

    fn walk_at<F>(&self, path: &str, visit: &mut F)
    where
        F: FnMut(&Schema, &str),
    {
        match &self.kind {
            SchemaKind::Object { properties, .. } => {
                for p in properties {
                    p.schema.walk_at(&format!("{path}.{}", p.name), visit);
                }
            }
            SchemaKind::Array(items) => items.walk_at(path, visit),
            _ if self.is_primitive() => visit(self, path),
            _ => {}
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
