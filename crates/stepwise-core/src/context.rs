//! `AgentContext`: the state shared between the agent loop and its UDFs.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use stepwise_contracts::{
    callable::CallableResult,
    error::{AgentError, AgentResult, ErrorCode, UdfError},
};
use stepwise_memory::AgentMemory;
use stepwise_sandbox::HostFunction;

use crate::traits::{ManagedAgent, Udf};

/// Everything a UDF may observe or touch while it runs.
///
/// Owned by one `CodeAgent` and shared with the sandbox host functions
/// through an `Arc`. Memory sits behind a `Mutex` that is never held across
/// an `.await`.
pub struct AgentContext {
    agent_name: String,
    udfs: Vec<Arc<dyn Udf>>,
    managed_agents: Vec<Arc<dyn ManagedAgent>>,
    memory: Mutex<AgentMemory>,
    planning_interval: Option<u32>,
    should_run_planning: AtomicBool,
    step_number: AtomicU32,
}

impl AgentContext {
    pub(crate) fn new(
        agent_name: impl Into<String>,
        udfs: Vec<Arc<dyn Udf>>,
        managed_agents: Vec<Arc<dyn ManagedAgent>>,
        planning_interval: Option<u32>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            udfs,
            managed_agents,
            memory: Mutex::new(AgentMemory::new("")),
            planning_interval,
            should_run_planning: AtomicBool::new(false),
            step_number: AtomicU32::new(1),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn udfs(&self) -> &[Arc<dyn Udf>] {
        &self.udfs
    }

    pub fn udf(&self, name: &str) -> Option<&Arc<dyn Udf>> {
        self.udfs.iter().find(|udf| udf.name() == name)
    }

    pub fn managed_agents(&self) -> &[Arc<dyn ManagedAgent>] {
        &self.managed_agents
    }

    pub fn managed_agent(&self, name: &str) -> Option<&Arc<dyn ManagedAgent>> {
        self.managed_agents.iter().find(|agent| agent.name() == name)
    }

    /// Run `f` with exclusive access to the agent's memory.
    pub fn with_memory<R>(&self, f: impl FnOnce(&mut AgentMemory) -> R) -> R {
        f(&mut self.lock_memory())
    }

    /// A copy of the memory as it stands now.
    pub fn memory_snapshot(&self) -> AgentMemory {
        self.lock_memory().clone()
    }

    fn lock_memory(&self) -> MutexGuard<'_, AgentMemory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The number of the step currently running (1-based).
    pub fn step_number(&self) -> u32 {
        self.step_number.load(Ordering::SeqCst)
    }

    pub(crate) fn set_step_number(&self, step_number: u32) {
        self.step_number.store(step_number, Ordering::SeqCst);
    }

    pub(crate) fn advance_step(&self) -> u32 {
        self.step_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn should_run_planning(&self) -> bool {
        self.should_run_planning.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_planning(&self) {
        self.should_run_planning.store(false, Ordering::SeqCst);
    }

    /// Request a planning step before the next action step.
    ///
    /// With `force` the flag is set unconditionally. Otherwise it is set only
    /// when a planning interval is configured and the current step number
    /// satisfies `step_number % interval == 1`. The flag is never cleared
    /// here.
    pub fn update_should_run_planning(&self, force: bool) {
        let due = match self.planning_interval {
            Some(interval) if interval > 0 => self.step_number() % interval == 1 % interval,
            _ => false,
        };
        if force || due {
            debug!(
                agent = %self.agent_name,
                step = self.step_number(),
                force,
                "planning requested"
            );
            self.should_run_planning.store(true, Ordering::SeqCst);
        }
    }

    /// Invoke the UDF called `name` with `input`.
    ///
    /// The input is validated against the UDF's input schema first. Any
    /// failure in validation, the hooks or the call itself is reported as a
    /// single `UDF_EXECUTION_ERROR` whose message repeats the UDF's contract.
    pub async fn call_udf(&self, name: &str, input: Value) -> AgentResult<Value> {
        let udf = self
            .udf(name)
            .cloned()
            .ok_or_else(|| AgentError::udf_not_found(format!("UDF {name} not found")))?;

        match self.invoke(udf.as_ref(), &input).await {
            Ok(output) => {
                debug!(agent = %self.agent_name, udf = %name, "UDF call succeeded");
                Ok(output)
            }
            Err(err) => {
                warn!(agent = %self.agent_name, udf = %name, error = %err, "UDF call failed");
                Err(AgentError::new(
                    ErrorCode::UdfExecutionError,
                    udf_failure_message(udf.as_ref(), &input, &err),
                ))
            }
        }
    }

    async fn invoke(&self, udf: &dyn Udf, input: &Value) -> Result<Value, UdfError> {
        udf.input_schema()
            .validate(input)
            .map_err(|e| UdfError::with_kind("ValidationError", e.to_string()))?;
        udf.on_before_call(input, self).await?;
        let output = udf.call(input.clone(), self).await?;
        udf.on_after_call(input, &output, self).await?;
        Ok(output)
    }
}

fn udf_failure_message(udf: &dyn Udf, input: &Value, err: &UdfError) -> String {
    let output_type = udf
        .output_schema()
        .map(|schema| schema.type_string())
        .unwrap_or_else(|| "any".to_string());
    format!(
        "Error when calling UDF {name} with arguments {input}: {err}\n\
         You should only call this UDF with a correct input.\n\
         As a reminder, this UDF's description is the following: '{description}'.\n\
         It takes inputs: {schema} and returns output type {output_type}",
        name = udf.name(),
        description = udf.description(),
        schema = udf.input_schema().to_json_schema(),
    )
}

/// Bridges a script call `name(arg)` to `AgentContext::call_udf`.
///
/// Only the first script argument is forwarded; a missing argument arrives
/// as `null`.
pub(crate) struct UdfHost {
    pub(crate) ctx: Arc<AgentContext>,
    pub(crate) name: String,
}

#[async_trait]
impl HostFunction for UdfHost {
    async fn invoke(&self, args: Vec<Value>) -> Result<CallableResult, AgentError> {
        let input = args.into_iter().next().unwrap_or(Value::Null);
        let output = self.ctx.call_udf(&self.name, input).await?;
        let summary = match self.ctx.udf(&self.name) {
            Some(udf) => udf.call_result_summary(&output).await,
            None => None,
        };
        Ok(CallableResult::new(self.name.clone(), output).with_summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use stepwise_schema::{Property, Schema};

    use super::*;

    // ── Mock helpers ──────────────────────────────────────────────────────────

    /// Records every lifecycle phase into a shared log.
    struct RecordingUdf {
        schema: Schema,
        events: Arc<Mutex<Vec<String>>>,
        fail_call: bool,
    }

    impl RecordingUdf {
        fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                schema: Schema::object(vec![Property::required(
                    "query",
                    Schema::string().describe("What to look up"),
                )]),
                events,
                fail_call: false,
            }
        }

        fn failing(events: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                fail_call: true,
                ..Self::new(events)
            }
        }
    }

    #[async_trait]
    impl Udf for RecordingUdf {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> &str {
            "Look something up"
        }

        fn input_schema(&self) -> &Schema {
            &self.schema
        }

        async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
            self.events.lock().unwrap().push("call".into());
            if self.fail_call {
                return Err(UdfError::with_kind("TypeError", "lookup backend is down"));
            }
            Ok(json!({ "found": input["query"] }))
        }

        async fn on_before_call(&self, _input: &Value, _ctx: &AgentContext) -> Result<(), UdfError> {
            self.events.lock().unwrap().push("before".into());
            Ok(())
        }

        async fn on_after_call(
            &self,
            _input: &Value,
            _output: &Value,
            _ctx: &AgentContext,
        ) -> Result<(), UdfError> {
            self.events.lock().unwrap().push("after".into());
            Ok(())
        }

        async fn call_result_summary(&self, output: &Value) -> Option<String> {
            Some(format!("found {}", output["found"]))
        }
    }

    fn context_with(udf: RecordingUdf, planning_interval: Option<u32>) -> Arc<AgentContext> {
        Arc::new(AgentContext::new(
            "tester",
            vec![Arc::new(udf)],
            Vec::new(),
            planning_interval,
        ))
    }

    // ── call_udf ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn hooks_run_in_order_around_the_call() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = context_with(RecordingUdf::new(Arc::clone(&events)), None);

        let output = ctx.call_udf("lookup", json!({"query": "rust"})).await.unwrap();

        assert_eq!(output, json!({"found": "rust"}));
        assert_eq!(*events.lock().unwrap(), vec!["before", "call", "after"]);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_udf() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = context_with(RecordingUdf::new(Arc::clone(&events)), None);

        let err = ctx.call_udf("lookup", json!({"query": 7})).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UdfExecutionError);
        assert!(err
            .message
            .starts_with("Error when calling UDF lookup with arguments {\"query\":7}: ValidationError:"));
        assert!(err.message.contains("You should only call this UDF with a correct input."));
        assert!(err
            .message
            .contains("this UDF's description is the following: 'Look something up'."));
        assert!(err.message.ends_with("returns output type any"));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_failures_carry_the_error_kind() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = context_with(RecordingUdf::failing(Arc::clone(&events)), None);

        let err = ctx.call_udf("lookup", json!({"query": "x"})).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UdfExecutionError);
        assert!(err.message.contains(": TypeError: lookup backend is down\n"));
        assert_eq!(*events.lock().unwrap(), vec!["before", "call"]);
    }

    #[tokio::test]
    async fn unknown_udf_is_not_found() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = context_with(RecordingUdf::new(events), None);

        let err = ctx.call_udf("search", json!({})).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UdfNotFound);
        assert_eq!(err.message, "UDF search not found");
    }

    // ── UdfHost ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn host_forwards_first_argument_and_summary() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = context_with(RecordingUdf::new(events), None);
        let host = UdfHost {
            ctx,
            name: "lookup".into(),
        };

        let result = host
            .invoke(vec![json!({"query": "tokio"}), json!("ignored")])
            .await
            .unwrap();

        assert_eq!(result.callable, "lookup");
        assert_eq!(result.return_value, json!({"found": "tokio"}));
        assert_eq!(result.return_value_summary.as_deref(), Some("found \"tokio\""));
    }

    // ── Planning flag ─────────────────────────────────────────────────────────

    #[test]
    fn forced_planning_sets_the_flag() {
        let ctx = context_with(RecordingUdf::new(Arc::default()), None);
        ctx.set_step_number(4);
        ctx.update_should_run_planning(false);
        assert!(!ctx.should_run_planning());

        ctx.update_should_run_planning(true);
        assert!(ctx.should_run_planning());
        ctx.clear_planning();
        assert!(!ctx.should_run_planning());
    }

    #[test]
    fn interval_planning_fires_on_matching_steps() {
        let ctx = context_with(RecordingUdf::new(Arc::default()), Some(2));
        let due: Vec<u32> = (1..=6)
            .filter(|step| {
                ctx.clear_planning();
                ctx.set_step_number(*step);
                ctx.update_should_run_planning(false);
                ctx.should_run_planning()
            })
            .collect();
        assert_eq!(due, vec![1, 3, 5]);
    }

    #[test]
    fn interval_of_one_fires_every_step() {
        let ctx = context_with(RecordingUdf::new(Arc::default()), Some(1));
        ctx.set_step_number(7);
        ctx.update_should_run_planning(false);
        assert!(ctx.should_run_planning());
    }

    #[test]
    fn memory_is_shared_through_the_context() {
        let ctx = context_with(RecordingUdf::new(Arc::default()), None);
        ctx.with_memory(|memory| memory.set_system_prompt("hello"));
        assert_eq!(ctx.memory_snapshot().system_prompt.system_prompt, "hello");
        assert_eq!(ctx.advance_step(), 2);
        assert_eq!(ctx.step_number(), 2);
    }
}
