use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use stepwise_contracts::error::UdfError;
use stepwise_schema::{Property, Schema};

use crate::{
    context::AgentContext,
    traits::{StoppingUdf, Udf},
};

/// Ends the run with the given answer. Returns its input unchanged.
///
/// The default answer shape is `{ answer: string }`; agents that need a
/// structured answer pass their own schema.
pub struct FinalAnswerUdf {
    description: String,
    schema: Schema,
    answer: Mutex<Option<Value>>,
}

impl FinalAnswerUdf {
    pub fn new() -> Self {
        Self::with_schema(Schema::object(vec![Property::required(
            "answer",
            Schema::string().describe("The final answer to the task"),
        )]))
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            description: format!(
                "Provide the final answer in the following format: {}",
                schema.type_string()
            ),
            schema,
            answer: Mutex::new(None),
        }
    }

    /// The most recent answer given, if any.
    pub fn answer(&self) -> Option<Value> {
        self.answer.lock().ok().and_then(|answer| answer.clone())
    }
}

impl Default for FinalAnswerUdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Udf for FinalAnswerUdf {
    fn name(&self) -> &str {
        "finalAnswer"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> &Schema {
        &self.schema
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.schema)
    }

    async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
        if let Ok(mut answer) = self.answer.lock() {
            *answer = Some(input.clone());
        }
        Ok(input)
    }

    fn as_stopping(&self) -> Option<&dyn StoppingUdf> {
        Some(self)
    }
}

impl StoppingUdf for FinalAnswerUdf {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::udf::test_support::context;

    #[test]
    fn default_signature_describes_the_answer_shape() {
        let udf = FinalAnswerUdf::new();
        let shape = "{\n  answer: string; // The final answer to the task\n}";
        assert_eq!(
            udf.description(),
            format!("Provide the final answer in the following format: {shape}")
        );
        assert!(udf.as_stopping().is_some());
        assert!(udf
            .signature()
            .ends_with(&format!("async function finalAnswer(params: {shape}): Promise<{shape}>")));
    }

    #[tokio::test]
    async fn returns_its_input_unchanged() {
        let udf = Arc::new(FinalAnswerUdf::new());
        let ctx = context(vec![udf.clone()]);

        let output = ctx.call_udf("finalAnswer", json!({"answer": "42"})).await.unwrap();

        assert_eq!(output, json!({"answer": "42"}));
        assert_eq!(udf.answer(), Some(json!({"answer": "42"})));
    }

    #[tokio::test]
    async fn custom_schema_constrains_the_answer() {
        let schema = Schema::object(vec![
            Property::required("city", Schema::string().describe("City name")),
            Property::required("population", Schema::number().describe("Inhabitants")),
        ]);
        let udf = Arc::new(FinalAnswerUdf::with_schema(schema));
        let ctx = context(vec![udf.clone()]);

        let err = ctx
            .call_udf("finalAnswer", json!({"city": "Paris"}))
            .await
            .unwrap_err();
        assert!(err.message.contains("ValidationError"));
        assert_eq!(udf.answer(), None);

        let output = ctx
            .call_udf("finalAnswer", json!({"city": "Paris", "population": 2100000}))
            .await
            .unwrap();
        assert_eq!(output["city"], "Paris");
    }
}
