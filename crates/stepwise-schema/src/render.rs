//! Prompt-facing type strings.
//!
//! The strings produced here are embedded verbatim into model prompts as UDF
//! call signatures, and the model's few-shot examples are written against
//! them. Output must stay byte-stable.

use serde_json::Value;

use crate::schema::{Schema, SchemaKind};

impl Schema {
    /// Render this node as a TypeScript-like pseudo type.
    ///
    /// ```text
    /// {
    ///   query: string; // What to search for
    ///   limit?: number;
    /// }
    /// ```
    pub fn type_string(&self) -> String {
        let comment = self
            .description
            .as_deref()
            .map(|d| format!(" // {d}"))
            .unwrap_or_default();

        match &self.kind {
            SchemaKind::Literal(value) => value.to_string(),
            SchemaKind::Object { properties, .. } => {
                let lines: Vec<String> = properties
                    .iter()
                    .map(|p| {
                        format!(
                            "{}{}: {}",
                            p.name,
                            if p.required { "" } else { "?" },
                            p.schema.type_string()
                        )
                    })
                    .collect();
                format!("{{\n  {}\n}}{comment}", lines.join("\n  "))
            }
            SchemaKind::Array(items) => format!("Array<{}>{comment}", items.type_string()),
            SchemaKind::Any => format!("any;{comment}"),
            SchemaKind::Union(members) => {
                let arms: Vec<String> = members.iter().map(Schema::bare_type).collect();
                format!("// {};{comment}", arms.join(" | "))
            }
            SchemaKind::Enum(values) => {
                let arms: Vec<String> = values.iter().map(raw).collect();
                format!("// {};{comment}", arms.join(" | "))
            }
            SchemaKind::String => format!("string;{comment}"),
            SchemaKind::Number | SchemaKind::Integer => format!("number;{comment}"),
            SchemaKind::Boolean => format!("boolean;{comment}"),
            SchemaKind::Null => format!("null;{comment}"),
            SchemaKind::Unknown => format!("unknown;{comment}"),
        }
    }

    /// Type name without terminator or comment, used for union arms.
    fn bare_type(&self) -> String {
        match &self.kind {
            SchemaKind::Literal(value) => raw(value),
            SchemaKind::String => "string".to_string(),
            SchemaKind::Number | SchemaKind::Integer => "number".to_string(),
            SchemaKind::Boolean => "boolean".to_string(),
            SchemaKind::Null => "null".to_string(),
            SchemaKind::Any => "any".to_string(),
            SchemaKind::Unknown => "unknown".to_string(),
            SchemaKind::Array(items) => format!("Array<{}>", items.bare_type()),
            SchemaKind::Union(members) => members
                .iter()
                .map(Schema::bare_type)
                .collect::<Vec<_>>()
                .join(" | "),
            SchemaKind::Enum(values) => values.iter().map(raw).collect::<Vec<_>>().join(" | "),
            SchemaKind::Object { .. } => Schema {
                description: None,
                ..self.clone()
            }
            .type_string(),
        }
    }
}

/// Render a callable signature the way the model sees its API surface.
///
/// Every description line is prefixed with `// `. A missing output schema
/// renders as `any`.
pub fn function_signature(
    name: &str,
    description: &str,
    input: &Schema,
    output: Option<&Schema>,
) -> String {
    let description_comment = description
        .split('\n')
        .map(|line| format!("// {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    let output_type = output
        .map(Schema::type_string)
        .unwrap_or_else(|| "any".to_string());
    format!(
        "{description_comment}\nasync function {name}(params: {}): Promise<{output_type}>",
        input.type_string()
    )
}

/// Strings render without quotes; everything else as JSON.
fn raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
