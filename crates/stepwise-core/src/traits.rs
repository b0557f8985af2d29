//! Core trait definitions for the stepwise agent loop.
//!
//! These traits are the seams of the runtime:
//!
//! - `ChatModel`   : the language model the agent drives
//! - `Udf`         : a user-defined function callable from agent scripts
//! - `StoppingUdf` : marker for UDFs whose invocation ends the run
//! - `ManagedAgent`: a sub-agent a manager can delegate to
//! - `StepHooks`   : observers invoked around every action step
//!
//! `CodeAgent` wires them together. Every trait is object-safe and
//! `Send + Sync`, so implementations are shared as `Arc<dyn ...>`.

use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::{
    error::{AgentResult, RunError, UdfError},
    message::Observation,
    model::{ChatRequest, ChatResponse, ModelError},
};
use stepwise_schema::{function_signature, Schema};

use crate::context::AgentContext;

/// A chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete `request`. The stop sequences must be honored by the
    /// provider; the agent does not post-process them.
    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// Complete `request` with a structured-output constraint.
    ///
    /// The default implementation attaches `schema` as a JSON-schema
    /// `response_format` and checks that the response content parses and
    /// conforms to it.
    async fn chat_completion_with_schema(
        &self,
        request: ChatRequest,
        schema: &Schema,
    ) -> Result<ChatResponse, ModelError> {
        let mut request = request;
        request.response_format = Some(json!({
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "strict": true,
                "schema": schema.to_json_schema(),
            },
        }));
        let response = self.chat_completion(request).await?;
        let parsed: Value = serde_json::from_str(&response.message.content).map_err(|e| {
            ModelError::InvalidResponse {
                reason: format!("response is not JSON: {e}"),
            }
        })?;
        schema
            .validate(&parsed)
            .map_err(|e| ModelError::InvalidResponse {
                reason: e.to_string(),
            })?;
        Ok(response)
    }
}

/// A user-defined function exposed to agent scripts.
///
/// The agent validates the input against `input_schema()` before
/// `on_before_call`, then runs `call` and `on_after_call`. Any failure in
/// the three phases is folded into one `UDF_EXECUTION_ERROR`.
///
/// UDFs with internal state (notebooks, datasheets) use interior
/// mutability: the agent only ever holds `&self`.
#[async_trait]
pub trait Udf: Send + Sync {
    /// Identifier scripts call. Unique within one agent.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> &Schema;

    /// `None` renders as `any` in the signature.
    fn output_schema(&self) -> Option<&Schema> {
        None
    }

    async fn call(&self, input: Value, ctx: &AgentContext) -> Result<Value, UdfError>;

    async fn on_before_call(&self, _input: &Value, _ctx: &AgentContext) -> Result<(), UdfError> {
        Ok(())
    }

    async fn on_after_call(
        &self,
        _input: &Value,
        _output: &Value,
        _ctx: &AgentContext,
    ) -> Result<(), UdfError> {
        Ok(())
    }

    /// Optional short rendering of `output` shown to the model in place of
    /// the full JSON.
    async fn call_result_summary(&self, _output: &Value) -> Option<String> {
        None
    }

    /// The `async function name(params: ...): Promise<...>` text embedded
    /// in prompts.
    fn signature(&self) -> String {
        function_signature(
            self.name(),
            self.description(),
            self.input_schema(),
            self.output_schema(),
        )
    }

    /// Stopping UDFs return `Some(self)`.
    fn as_stopping(&self) -> Option<&dyn StoppingUdf> {
        None
    }
}

/// A UDF whose invocation terminates the run. Its return value becomes the
/// final answer unless the script itself returns a value.
pub trait StoppingUdf: Udf {}

/// A sub-agent reachable from a manager through a generated `call<Name>` UDF.
#[async_trait]
pub trait ManagedAgent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Shape of the report returned by `call`, when declared.
    fn output_schema(&self) -> Option<&Schema> {
        None
    }

    /// Run the sub-agent on `task` and return its framed report.
    ///
    /// Calls are serialized: a second call waits for the first to finish.
    async fn call(&self, task: &str, observations: Vec<Observation>) -> AgentResult<Value>;
}

/// Observers run around every action step.
///
/// A hook returning `RunError::Agent` records the error on the current step
/// and the loop continues; `RunError::Internal` aborts the run.
#[async_trait]
pub trait StepHooks: Send + Sync {
    async fn before_step(&self, _ctx: &AgentContext) -> Result<(), RunError> {
        Ok(())
    }

    async fn after_step(&self, _ctx: &AgentContext) -> Result<(), RunError> {
        Ok(())
    }
}
