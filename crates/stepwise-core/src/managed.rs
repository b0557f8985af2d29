//! `ManagedCodeAgent`: a `CodeAgent` exposed to a manager as a sub-agent.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use stepwise_config::render;
use stepwise_contracts::{
    error::{AgentError, AgentResult, ErrorCode},
    message::Observation,
};
use stepwise_memory::AgentMemory;
use stepwise_schema::Schema;

use crate::{agent::CodeAgent, traits::ManagedAgent};

/// Wraps a `CodeAgent` so a manager can delegate to it.
///
/// The manager's task is framed with the `managed_agent.task` template and
/// the sub-agent's answer with `managed_agent.report`. The inner agent is
/// locked for the whole run, so concurrent calls are served one at a time.
pub struct ManagedCodeAgent {
    name: String,
    description: String,
    output_schema: Option<Schema>,
    task_template: String,
    report_template: String,
    agent: Mutex<CodeAgent>,
}

impl ManagedCodeAgent {
    pub fn new(agent: CodeAgent) -> Self {
        Self {
            name: agent.name().to_string(),
            description: agent.description().to_string(),
            output_schema: agent.output_schema().cloned(),
            task_template: agent.prompts().managed_agent.task.clone(),
            report_template: agent.prompts().managed_agent.report.clone(),
            agent: Mutex::new(agent),
        }
    }

    /// The sub-agent's memory once any in-flight call has finished.
    pub async fn memory(&self) -> AgentMemory {
        self.agent.lock().await.memory()
    }
}

#[async_trait]
impl ManagedAgent for ManagedCodeAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn output_schema(&self) -> Option<&Schema> {
        self.output_schema.as_ref()
    }

    async fn call(&self, task: &str, observations: Vec<Observation>) -> AgentResult<Value> {
        let mut agent = self.agent.lock().await;
        let framed = render(&self.task_template, &[("name", &self.name), ("task", task)]);
        info!(agent = %self.name, "managed agent called");

        let report = agent.run(&framed, observations).await.map_err(|err| {
            warn!(agent = %self.name, error = %err, "managed agent failed");
            AgentError::new(
                ErrorCode::ManagedAgentError,
                format!("Managed agent {} failed: {err}", self.name),
            )
        })?;

        let final_answer = match report {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => "The agent stopped without providing a final answer.".to_string(),
        };
        Ok(Value::String(render(
            &self.report_template,
            &[("name", &self.name), ("final_answer", &final_answer)],
        )))
    }
}
