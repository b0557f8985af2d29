use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::error::UdfError;
use stepwise_schema::{Property, Schema};

use crate::{
    context::AgentContext,
    traits::{StoppingUdf, Udf},
};

/// Ends the run without an answer of its own; the reason becomes the result.
pub struct TerminateUdf {
    input: Schema,
    output: Schema,
}

impl TerminateUdf {
    pub fn new() -> Self {
        Self {
            input: Schema::object(vec![Property::required(
                "reason",
                Schema::string().describe("The reason for terminating the task"),
            )])
            .with_default(json!({ "reason": "The task is complete" })),
            output: Schema::string(),
        }
    }
}

impl Default for TerminateUdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Udf for TerminateUdf {
    fn name(&self) -> &str {
        "terminate"
    }

    fn description(&self) -> &str {
        "Terminate the agent."
    }

    fn input_schema(&self) -> &Schema {
        &self.input
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.output)
    }

    async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
        match input.get("reason") {
            Some(reason) => Ok(reason.clone()),
            None => Err(UdfError::with_kind("TypeError", "missing 'reason'")),
        }
    }

    fn as_stopping(&self) -> Option<&dyn StoppingUdf> {
        Some(self)
    }
}

impl StoppingUdf for TerminateUdf {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::udf::test_support::context;

    #[tokio::test]
    async fn returns_the_reason() {
        let ctx = context(vec![Arc::new(TerminateUdf::new())]);
        let output = ctx
            .call_udf("terminate", json!({"reason": "nothing left to do"}))
            .await
            .unwrap();
        assert_eq!(output, json!("nothing left to do"));
    }

    #[test]
    fn is_a_stopping_udf_with_a_default_reason() {
        let udf = TerminateUdf::new();
        assert!(udf.as_stopping().is_some());
        assert_eq!(
            udf.input_schema().default_instance(),
            json!({"reason": "The task is complete"})
        );
    }
}
