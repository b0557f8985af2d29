use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::error::UdfError;
use stepwise_sandbox::format::{format_bytes, stringify_with_indent};
use stepwise_schema::{Property, Schema};

use crate::{context::AgentContext, traits::Udf};

/// Accumulates free-form notes across steps.
///
/// Strings, numbers and booleans are appended as text; objects, arrays and
/// `null` as pretty JSON. Entries are concatenated without a separator.
pub struct NotebookWriteUdf {
    input: Schema,
    output: Schema,
    content: Mutex<String>,
}

impl NotebookWriteUdf {
    pub fn new() -> Self {
        Self {
            input: Schema::any(),
            output: Schema::object(vec![
                Property::required("success", Schema::boolean()),
                Property::required("contentSize", Schema::string()),
            ]),
            content: Mutex::new(String::new()),
        }
    }

    pub fn content(&self) -> String {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for NotebookWriteUdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Udf for NotebookWriteUdf {
    fn name(&self) -> &str {
        "notebookWrite"
    }

    fn description(&self) -> &str {
        "Write strings and objects to the notebook"
    }

    fn input_schema(&self) -> &Schema {
        &self.input
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.output)
    }

    async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
        let text = match &input {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => stringify_with_indent(other, Some("  ")),
        };
        let size = {
            let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);
            content.push_str(&text);
            content.len()
        };
        Ok(json!({
            "success": true,
            "contentSize": format_bytes(size),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::udf::test_support::context;

    #[tokio::test]
    async fn appends_text_and_reports_size() {
        let udf = Arc::new(NotebookWriteUdf::new());
        let ctx = context(vec![udf.clone()]);

        let first = ctx.call_udf("notebookWrite", json!("Hello")).await.unwrap();
        assert_eq!(first, json!({"success": true, "contentSize": "5 Bytes"}));

        ctx.call_udf("notebookWrite", json!(42)).await.unwrap();
        ctx.call_udf("notebookWrite", json!(true)).await.unwrap();
        assert_eq!(udf.content(), "Hello42true");
    }

    #[tokio::test]
    async fn objects_are_written_as_pretty_json() {
        let udf = Arc::new(NotebookWriteUdf::new());
        let ctx = context(vec![udf.clone()]);

        ctx.call_udf("notebookWrite", json!({"a": [1]})).await.unwrap();

        assert_eq!(udf.content(), "{\n  \"a\": [\n    1\n  ]\n}");
    }
}
