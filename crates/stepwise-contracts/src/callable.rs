//! Results of host-callable invocations recorded by the sandbox.

use serde::{Deserialize, Serialize};

/// One UDF invocation made from inside a script.
///
/// The script only ever sees `return_value`; the summary and callable name
/// are kept for rendering the call-result block fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallableResult {
    pub return_value: serde_json::Value,
    pub return_value_summary: Option<String>,
    pub callable: String,
}

impl CallableResult {
    pub fn new(callable: impl Into<String>, return_value: serde_json::Value) -> Self {
        Self {
            return_value,
            return_value_summary: None,
            callable: callable.into(),
        }
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.return_value_summary = summary;
        self
    }
}
