//! The `Schema` tree and its builders.

use serde_json::Value;
use thiserror::Error;

use stepwise_contracts::error::AgentError;

/// One node of a declarative data shape.
///
/// Every node may carry a description (rendered as a trailing `// comment`
/// in type strings) and an explicit default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub description: Option<String>,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Object {
        /// Declaration order is preserved in type strings and default instances.
        properties: Vec<Property>,
        additional_properties: bool,
    },
    Array(Box<Schema>),
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Literal(Value),
    Union(Vec<Schema>),
    Enum(Vec<Value>),
    Any,
    Unknown,
}

/// A named object property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Property {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Json schema instance array type cannot be empty")]
    EmptyArray,

    #[error("Invalid json schema instance: array items must be of the same type: {kinds}")]
    MixedArray { kinds: String },

    /// The instance did not conform. One entry per violation.
    #[error("{}", violations.join("; "))]
    Invalid { violations: Vec<String> },

    #[error("invalid schema document: {reason}")]
    Malformed { reason: String },
}

impl From<SchemaError> for AgentError {
    fn from(err: SchemaError) -> Self {
        AgentError::validation(err.to_string())
    }
}

impl Schema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
            default: None,
        }
    }

    pub fn object(properties: Vec<Property>) -> Self {
        Self::new(SchemaKind::Object {
            properties,
            additional_properties: true,
        })
    }

    pub fn array(items: Schema) -> Self {
        Self::new(SchemaKind::Array(Box::new(items)))
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String)
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number)
    }

    pub fn integer() -> Self {
        Self::new(SchemaKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn null() -> Self {
        Self::new(SchemaKind::Null)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(SchemaKind::Literal(value.into()))
    }

    pub fn union(members: Vec<Schema>) -> Self {
        Self::new(SchemaKind::Union(members))
    }

    pub fn enumeration(values: Vec<Value>) -> Self {
        Self::new(SchemaKind::Enum(values))
    }

    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    pub fn unknown() -> Self {
        Self::new(SchemaKind::Unknown)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Closed objects reject keys not listed in `properties`.
    pub fn closed(mut self) -> Self {
        if let SchemaKind::Object {
            additional_properties,
            ..
        } = &mut self.kind
        {
            *additional_properties = false;
        }
        self
    }

    /// True for string, number, integer, boolean, and null nodes.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::String
                | SchemaKind::Number
                | SchemaKind::Integer
                | SchemaKind::Boolean
                | SchemaKind::Null
        )
    }

    /// Look up an object property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        match &self.kind {
            SchemaKind::Object { properties, .. } => properties.iter().find(|p| p.name == name),
            _ => None,
        }
    }
}
