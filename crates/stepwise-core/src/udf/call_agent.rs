use async_trait::async_trait;
use serde_json::Value;

use stepwise_contracts::error::UdfError;
use stepwise_schema::{Property, Schema};

use crate::{context::AgentContext, traits::Udf};

/// Delegates a task to a managed agent.
///
/// Generated by `CodeAgent` for every managed agent; the name is `call`
/// followed by the agent's name in PascalCase (`web researcher` becomes
/// `callWebResearcher`).
pub struct CallAgentUdf {
    name: String,
    description: String,
    agent_name: String,
    input: Schema,
    output: Option<Schema>,
}

impl CallAgentUdf {
    pub fn new(agent_name: &str, agent_description: &str, output: Option<Schema>) -> Self {
        Self {
            name: udf_name_for(agent_name),
            description: format!(
                "Call the {agent_name} agent for help. Here's a description of the agent: {agent_description}"
            ),
            agent_name: agent_name.to_string(),
            input: Schema::object(vec![Property::required(
                "task",
                Schema::string().describe("The task to be performed by the agent"),
            )]),
            output,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }
}

/// `call` + each whitespace-separated word with its first letter upper-cased.
pub(crate) fn udf_name_for(agent_name: &str) -> String {
    let words: String = agent_name
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    format!("call{words}")
}

#[async_trait]
impl Udf for CallAgentUdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> &Schema {
        &self.input
    }

    fn output_schema(&self) -> Option<&Schema> {
        self.output.as_ref()
    }

    async fn call(&self, input: Value, ctx: &AgentContext) -> Result<Value, UdfError> {
        let agent = ctx
            .managed_agent(&self.agent_name)
            .cloned()
            .ok_or_else(|| UdfError::new(format!("Agent {} not found", self.agent_name)))?;
        let task = input
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(agent.call(task, Vec::new()).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use stepwise_contracts::{
        error::{AgentResult, ErrorCode},
        message::Observation,
    };

    use super::*;
    use crate::traits::ManagedAgent;

    struct EchoAgent {
        tasks: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ManagedAgent for EchoAgent {
        fn name(&self) -> &str {
            "web researcher"
        }

        fn description(&self) -> &str {
            "Searches the web"
        }

        async fn call(&self, task: &str, _observations: Vec<Observation>) -> AgentResult<Value> {
            self.tasks.lock().unwrap().push(task.to_string());
            Ok(json!(format!("report on {task}")))
        }
    }

    #[test]
    fn names_are_pascal_cased() {
        assert_eq!(udf_name_for("web researcher"), "callWebResearcher");
        assert_eq!(udf_name_for("analyst"), "callAnalyst");
        assert_eq!(udf_name_for("  data   cruncher "), "callDataCruncher");
    }

    #[test]
    fn description_names_the_agent() {
        let udf = CallAgentUdf::new("analyst", "Crunches numbers", None);
        assert_eq!(
            udf.description(),
            "Call the analyst agent for help. Here's a description of the agent: Crunches numbers"
        );
        assert!(udf.signature().ends_with("Promise<any>"));
    }

    #[tokio::test]
    async fn delegates_to_the_managed_agent() {
        let tasks = Arc::new(Mutex::new(Vec::new()));
        let agent: Arc<dyn ManagedAgent> = Arc::new(EchoAgent {
            tasks: Arc::clone(&tasks),
        });
        let udf: Arc<dyn Udf> =
            Arc::new(CallAgentUdf::new("web researcher", "Searches the web", None));
        let ctx = AgentContext::new("manager", vec![udf], vec![agent], None);

        let output = ctx
            .call_udf("callWebResearcher", json!({"task": "rust 2024"}))
            .await
            .unwrap();

        assert_eq!(output, json!("report on rust 2024"));
        assert_eq!(*tasks.lock().unwrap(), vec!["rust 2024"]);
    }

    #[tokio::test]
    async fn missing_agent_is_an_execution_error() {
        let udf: Arc<dyn Udf> = Arc::new(CallAgentUdf::new("ghost", "Not registered", None));
        let ctx = AgentContext::new("manager", vec![udf], Vec::new(), None);

        let err = ctx
            .call_udf("callGhost", json!({"task": "boo"}))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UdfExecutionError);
        assert!(err.message.contains("Error: Agent ghost not found"));
    }
}
