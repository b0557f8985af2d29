use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::error::UdfError;
use stepwise_schema::Schema;

use crate::{context::AgentContext, traits::Udf};

/// Lets the model ask for a planning step before its next action.
pub struct ThinkUdf {
    schema: Schema,
}

impl ThinkUdf {
    pub fn new() -> Self {
        Self {
            schema: Schema::any(),
        }
    }
}

impl Default for ThinkUdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Udf for ThinkUdf {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Reflect on the steps taken so far and update the plan if improvements / changes should be made"
    }

    fn input_schema(&self) -> &Schema {
        &self.schema
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.schema)
    }

    async fn call(&self, _input: Value, ctx: &AgentContext) -> Result<Value, UdfError> {
        ctx.update_should_run_planning(true);
        Ok(json!("Thinking..."))
    }
}
