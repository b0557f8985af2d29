//! `CodeAgent`: the prompt → model → script → observation loop.
//!
//! Each iteration either runs a planning step (which consumes no step
//! budget) or an action step: the model sees the full memory, answers with a
//! fenced script, the script runs in the agent's sandbox, and its console
//! output is recorded as an observation. A call to a stopping UDF ends the
//! run.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use stepwise_config::{render, AgentSettings, PromptTemplates};
use stepwise_contracts::{
    agent::RunId,
    error::{AgentError, AgentResult, ErrorCode, RunError},
    logger::{AgentLogger, LogLevel},
    message::{ChatMessage, Observation},
    model::{ChatRequest, ChatResponse},
};
use stepwise_memory::{ActionStep, AgentMemory, MemoryStep, PlanningStep, TaskStep};
use stepwise_sandbox::{format::truncate_content, Sandbox, SandboxOptions, ScriptSandbox};
use stepwise_schema::Schema;

use crate::{
    context::{AgentContext, UdfHost},
    logger::TracingLogger,
    traits::{ChatModel, ManagedAgent, StepHooks, Udf},
    udf::CallAgentUdf,
};

const CODE_STOP_SEQUENCES: [&str; 2] = ["<end_code>", "Observation:"];
const PLAN_STOP_SEQUENCE: &str = "<end_plan>";
const LLM_OUTPUT_TITLE: &str = "--- Output message of the LLM ---";
const EXECUTION_RESULTS_TITLE: &str = "-- Script execution results --";
const NO_OUTPUT_NOTICE: &str = "No output from script execution";

/// Consecutive identical step errors that halt the run.
const CIRCUIT_BREAKER_WINDOW: usize = 3;

/// What one script run contributed to the step.
struct ScriptExecution {
    result: Option<Value>,
    output: String,
    is_final_answer: bool,
}

/// An agent that solves tasks by writing and running scripts.
///
/// Build one with [`CodeAgent::builder`]. `run` drives the loop until a
/// stopping UDF is called, the step budget is spent, or the same error
/// repeats three times in a row.
pub struct CodeAgent {
    name: String,
    description: String,
    model: Arc<dyn ChatModel>,
    ctx: Arc<AgentContext>,
    sandbox: Box<dyn ScriptSandbox>,
    prompts: PromptTemplates,
    settings: AgentSettings,
    output_schema: Option<Schema>,
    logger: Arc<dyn AgentLogger>,
    hooks: Vec<Arc<dyn StepHooks>>,
    warnings: Vec<String>,
    task: String,
}

impl CodeAgent {
    pub fn builder(name: impl Into<String>, model: Arc<dyn ChatModel>) -> CodeAgentBuilder {
        CodeAgentBuilder {
            name: name.into(),
            description: String::new(),
            model,
            udfs: Vec::new(),
            managed_agents: Vec::new(),
            settings: AgentSettings::default(),
            prompts: None,
            sandbox: None,
            logger: None,
            hooks: Vec::new(),
            output_schema: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn prompts(&self) -> &PromptTemplates {
        &self.prompts
    }

    pub fn output_schema(&self) -> Option<&Schema> {
        self.output_schema.as_ref()
    }

    /// The task of the current or most recent run.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn step_number(&self) -> u32 {
        self.ctx.step_number()
    }

    /// A copy of the memory as it stands now.
    pub fn memory(&self) -> AgentMemory {
        self.ctx.memory_snapshot()
    }

    /// Construction-time warnings about undocumented UDF inputs.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn write_memory_to_messages(&self, summary_mode: bool) -> Vec<ChatMessage> {
        self.ctx.with_memory(|memory| memory.write_to_messages(summary_mode))
    }

    /// Replay the recorded steps through the agent's logger.
    pub fn replay(&self, detailed: bool) {
        self.memory().replay(self.logger.as_ref(), detailed);
    }

    pub async fn call_udf(&self, name: &str, input: Value) -> AgentResult<Value> {
        self.ctx.call_udf(name, input).await
    }

    /// Every UDF signature, blank-line separated, as embedded in prompts.
    pub fn udf_signatures(&self) -> String {
        self.ctx
            .udfs()
            .iter()
            .map(|udf| udf.signature())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn system_prompt(&self) -> String {
        render(
            &self.prompts.system_prompt,
            &[
                ("udfs", &self.udf_signatures()),
                ("description", &self.description),
            ],
        )
    }

    fn team_members(&self) -> String {
        let agents = self.ctx.managed_agents();
        if agents.is_empty() {
            return String::new();
        }
        let listing = agents
            .iter()
            .map(|agent| format!("- {}: {}", agent.name(), agent.description()))
            .collect::<Vec<_>>()
            .join("\n");
        render(&self.prompts.planning.team_members, &[("agents", &listing)])
    }

    /// Solve `task`.
    ///
    /// Returns `Ok(Some(answer))` when a stopping UDF was called, `Ok(None)`
    /// when the step budget ran out or the circuit breaker tripped. Step
    /// failures are recorded in memory, not returned. Planning-model
    /// failures and internal hook failures abort the run.
    pub async fn run(
        &mut self,
        task: &str,
        observations: Vec<Observation>,
    ) -> Result<Option<Value>, RunError> {
        let run_id = RunId::new();

        // ── Step 1: reset the loop and seed memory ──
        self.task = task.to_string();
        self.ctx.set_step_number(1);
        let system_prompt = self.system_prompt();
        self.ctx.with_memory(|memory| {
            memory.set_system_prompt(system_prompt);
            memory.push(MemoryStep::Task(TaskStep {
                task: task.to_string(),
                observations,
            }));
        });
        if self.settings.plan_first {
            self.ctx.update_should_run_planning(true);
        }
        self.logger.log_task(task.trim());
        info!(
            run_id = %run_id,
            agent = %self.name,
            max_steps = self.settings.max_steps,
            "run started"
        );

        // ── Step 2: plan or act until an answer or a limit ──
        let mut final_answer = None;
        while final_answer.is_none()
            && self.ctx.step_number() <= self.settings.max_steps
            && !self.error_circuit_breaker()
        {
            if self.ctx.should_run_planning() {
                self.planning_step().await?;
                continue;
            }

            let step_number = self.ctx.step_number();
            let mut action = ActionStep::new(step_number);
            let index = self.ctx.with_memory(|memory| {
                memory.push(MemoryStep::Action(action.clone()));
                memory.steps.len() - 1
            });
            self.logger
                .log_rule(&format!("Step {step_number}"), LogLevel::Info);

            let fatal = match self.run_action(&mut action).await {
                Ok(answer) => {
                    final_answer = answer;
                    None
                }
                Err(RunError::Agent(err)) => {
                    warn!(
                        run_id = %run_id,
                        step = step_number,
                        code = %err.code,
                        error = %err,
                        "step failed"
                    );
                    action.error = Some(err);
                    None
                }
                Err(internal) => Some(internal),
            };

            action.finish();
            self.commit_action(index, action);
            self.ctx.advance_step();

            if let Some(err) = fatal {
                error!(run_id = %run_id, step = step_number, error = %err, "run aborted");
                return Err(err);
            }
        }

        // ── Step 3: record why the loop stopped ──
        if final_answer.is_none() {
            let step_number = self.ctx.step_number();
            if step_number > self.settings.max_steps {
                let mut step = ActionStep::new(step_number);
                step.error = Some(AgentError::new(
                    ErrorCode::MaxStepsReached,
                    "Reached max steps",
                ));
                step.finish();
                self.ctx
                    .with_memory(|memory| memory.push(MemoryStep::Action(step)));
                warn!(run_id = %run_id, max_steps = self.settings.max_steps, "step budget exhausted");
            } else {
                warn!(run_id = %run_id, step = step_number, "error circuit breaker tripped");
            }
        }

        info!(
            run_id = %run_id,
            agent = %self.name,
            steps = self.ctx.step_number() - 1,
            answered = final_answer.is_some(),
            "run finished"
        );
        Ok(final_answer)
    }

    async fn run_action(&mut self, action: &mut ActionStep) -> Result<Option<Value>, RunError> {
        for hook in &self.hooks {
            hook.before_step(&self.ctx).await?;
        }
        let answer = self.step(action).await?;
        self.after_step().await?;
        Ok(answer)
    }

    async fn after_step(&self) -> Result<(), RunError> {
        self.ctx.update_should_run_planning(false);
        for hook in &self.hooks {
            hook.after_step(&self.ctx).await?;
        }
        Ok(())
    }

    /// Write the finished step back over its placeholder.
    fn commit_action(&self, index: usize, action: ActionStep) {
        self.ctx.with_memory(|memory| match memory.steps.get_mut(index) {
            Some(MemoryStep::Action(slot)) if slot.step_number == action.step_number => {
                *slot = action;
            }
            _ => memory.push(MemoryStep::Action(action)),
        });
    }

    /// Run one action step, filling `action` as it goes.
    ///
    /// Returns the final answer when a stopping UDF was called.
    pub async fn step(&mut self, action: &mut ActionStep) -> AgentResult<Option<Value>> {
        // ── Step 1: ask the model for a script ──
        let messages = self.write_memory_to_messages(false);
        action.model_input_messages = Some(messages.clone());
        let response = self
            .chat(ChatRequest::new(messages).with_stop(CODE_STOP_SEQUENCES))
            .await?;
        let model_output = response.message.content.clone();
        action.model_output_message = Some(response.message);
        action.model_output = Some(model_output.clone());
        self.logger.log_markdown(Some(LLM_OUTPUT_TITLE), &model_output);

        // ── Step 2: run it ──
        let code = parse_code_output(&model_output);
        debug!(
            agent = %self.name,
            step = action.step_number,
            code_len = code.len(),
            "executing script"
        );
        let execution = self.execute_script(&code).await?;
        action.model_output = Some(code);
        action.action_output = execution.result.clone();

        // ── Step 3: feed the console back ──
        let body = if execution.output.is_empty() {
            NO_OUTPUT_NOTICE.to_string()
        } else {
            truncate_content(&execution.output, self.settings.observation_max_length)
        };
        action
            .observations
            .push(Observation::text(format!("{EXECUTION_RESULTS_TITLE}\n{body}")));
        self.logger.log_markdown(Some(EXECUTION_RESULTS_TITLE), &body);

        // ── Step 4: termination ──
        if !execution.is_final_answer {
            return Ok(None);
        }
        let answer = execution.result.unwrap_or(Value::Null);
        if let Some(schema) = &self.output_schema {
            schema.validate(&answer).map_err(|e| {
                AgentError::validation(format!(
                    "The final answer does not match the expected output schema: {e}"
                ))
            })?;
        }
        info!(agent = %self.name, step = action.step_number, "final answer produced");
        Ok(Some(answer))
    }

    async fn execute_script(&mut self, code: &str) -> AgentResult<ScriptExecution> {
        let output = self
            .sandbox
            .execute_script(code)
            .await
            .map_err(|err| AgentError::script_failed(format!("Error executing code: {}", err.message)))?;

        let terminating = output.calls.iter().find(|call| {
            self.ctx
                .udf(&call.callable)
                .is_some_and(|udf| udf.as_stopping().is_some())
        });
        let is_final_answer = terminating.is_some();
        let result = match output.return_value {
            Some(value) if !value.is_null() => Some(value),
            _ => terminating.map(|call| call.return_value.clone()),
        };

        Ok(ScriptExecution {
            result,
            output: output.output,
            is_final_answer,
        })
    }

    /// Record a facts survey and a plan.
    ///
    /// The first planning of a run works from the task alone. Later ones
    /// replay the summarized memory and account for the remaining budget.
    pub async fn planning_step(&mut self) -> AgentResult<()> {
        let initial = self.ctx.step_number() == 1
            || self.ctx.with_memory(|memory| memory.planning_steps().next().is_none());
        let udfs = self.udf_signatures();
        let team_members = self.team_members();
        let planning = &self.prompts.planning;

        let step = if initial {
            let facts_input = vec![
                ChatMessage::system(planning.initial_facts.clone()),
                ChatMessage::user(format!(
                    "Here is the task:\n```\n{}\n```\nNow begin!",
                    self.task
                )),
            ];
            let facts_message = self.chat(ChatRequest::new(facts_input.clone())).await?.message;

            let plan_prompt = render(
                &planning.initial_plan,
                &[
                    ("task", &self.task),
                    ("udfs", &udfs),
                    ("team_members", &team_members),
                    ("answer_facts", &facts_message.content),
                ],
            );
            let plan_message = self
                .chat(
                    ChatRequest::new(vec![ChatMessage::user(plan_prompt)])
                        .with_stop([PLAN_STOP_SEQUENCE]),
                )
                .await?
                .message;

            PlanningStep {
                model_input_messages: facts_input,
                facts: format!(
                    "Here are the facts that I know so far:\n\n{}\n",
                    facts_message.content
                )
                .trim()
                .to_string(),
                plan: format!(
                    "Here is the plan of action that I will follow to solve the task:\n\n{}\n",
                    plan_message.content
                ),
                model_output_message_facts: facts_message,
                model_output_message_plan: plan_message,
            }
        } else {
            let history = self.write_memory_to_messages(true);

            let mut facts_input = vec![ChatMessage::system(
                planning.update_facts_pre_messages.clone(),
            )];
            facts_input.extend(history.iter().cloned());
            facts_input.push(ChatMessage::user(planning.update_facts_post_messages.clone()));
            let facts_message = self.chat(ChatRequest::new(facts_input.clone())).await?.message;

            let remaining_steps = i64::from(self.settings.max_steps) - i64::from(self.ctx.step_number());
            let mut plan_input = vec![ChatMessage::system(render(
                &planning.update_plan_pre_messages,
                &[("task", &self.task)],
            ))];
            plan_input.extend(history);
            plan_input.push(ChatMessage::user(render(
                &planning.update_plan_post_messages,
                &[
                    ("task", &self.task),
                    ("udfs", &udfs),
                    ("team_members", &team_members),
                    ("facts_update", &facts_message.content),
                    ("remaining_steps", &remaining_steps.to_string()),
                ],
            )));
            let plan_message = self
                .chat(ChatRequest::new(plan_input).with_stop([PLAN_STOP_SEQUENCE]))
                .await?
                .message;

            PlanningStep {
                model_input_messages: facts_input,
                facts: format!(
                    "Here is the updated list of the facts that I know:\n```\n{}\n```",
                    facts_message.content
                ),
                plan: format!(
                    "I still need to solve the task I was given:\n```\n{}\n```\n\nHere is my new/updated plan of action to solve the task:\n```\n{}\n```",
                    self.task, plan_message.content
                ),
                model_output_message_facts: facts_message,
                model_output_message_plan: plan_message,
            }
        };

        let title = if initial { "Initial plan" } else { "Updated plan" };
        self.logger.log_rule(title, LogLevel::Info);
        self.logger.log(LogLevel::Info, &step.plan);
        debug!(agent = %self.name, step = self.ctx.step_number(), initial, "planning step recorded");

        self.ctx
            .with_memory(|memory| memory.push(MemoryStep::Planning(step)));
        self.ctx.clear_planning();
        Ok(())
    }

    /// Ask the model for an answer from the memory alone.
    ///
    /// Used when a run ended without one; never called by `run` itself.
    pub async fn provide_final_answer(&self, task: &str) -> AgentResult<String> {
        let mut messages = vec![ChatMessage::system(
            self.prompts.final_answer.pre_messages.clone(),
        )];
        messages.extend(self.write_memory_to_messages(false).into_iter().skip(1));
        messages.push(ChatMessage::user(render(
            &self.prompts.final_answer.post_messages,
            &[("task", task)],
        )));
        let response = self.chat(ChatRequest::new(messages)).await?;
        Ok(response.message.content)
    }

    async fn chat(&self, request: ChatRequest) -> AgentResult<ChatResponse> {
        self.model.chat_completion(request).await.map_err(|e| {
            AgentError::new(
                ErrorCode::ModelOutputError,
                format!("Error generating model output: {e}"),
            )
        })
    }

    /// True when the last three action steps failed with the same message.
    fn error_circuit_breaker(&self) -> bool {
        self.ctx.with_memory(|memory| {
            let recent: Vec<&ActionStep> = memory
                .action_steps()
                .rev()
                .take(CIRCUIT_BREAKER_WINDOW)
                .collect();
            if recent.len() < CIRCUIT_BREAKER_WINDOW {
                return false;
            }
            let Some(last) = recent[0].error.as_ref() else {
                return false;
            };
            recent
                .iter()
                .all(|step| step.error.as_ref().is_some_and(|e| e.message == last.message))
        })
    }
}

fn let_const_regex() -> Option<&'static Regex> {
    static LET_CONST: OnceLock<Option<Regex>> = OnceLock::new();
    LET_CONST
        .get_or_init(|| Regex::new(r"(?m)^\s*(?:let|const)\s+").ok())
        .as_ref()
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:js|javascript|ts|typescript)?\s*\n?(.*?)\n?```").ok())
        .as_ref()
}

/// Extract the script from a model answer.
///
/// Leading `let`/`const` keywords are stripped from every line so that
/// declarations become persistent globals. The first fenced block (untagged
/// or tagged js/javascript/ts/typescript) wins; without one the whole
/// sanitized text is the script.
pub fn parse_code_output(text: &str) -> String {
    let sanitized = match let_const_regex() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    fence_regex()
        .and_then(|re| re.captures(&sanitized))
        .and_then(|caps| caps.get(1))
        .map(|code| code.as_str().to_string())
        .unwrap_or(sanitized)
}

/// Configures and validates a [`CodeAgent`].
pub struct CodeAgentBuilder {
    name: String,
    description: String,
    model: Arc<dyn ChatModel>,
    udfs: Vec<Arc<dyn Udf>>,
    managed_agents: Vec<Arc<dyn ManagedAgent>>,
    settings: AgentSettings,
    prompts: Option<PromptTemplates>,
    sandbox: Option<Box<dyn ScriptSandbox>>,
    logger: Option<Arc<dyn AgentLogger>>,
    hooks: Vec<Arc<dyn StepHooks>>,
    output_schema: Option<Schema>,
}

impl CodeAgentBuilder {
    /// Rendered into the system prompt and shown to managers.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn udf(mut self, udf: Arc<dyn Udf>) -> Self {
        self.udfs.push(udf);
        self
    }

    pub fn udfs(mut self, udfs: impl IntoIterator<Item = Arc<dyn Udf>>) -> Self {
        self.udfs.extend(udfs);
        self
    }

    pub fn managed_agent(mut self, agent: Arc<dyn ManagedAgent>) -> Self {
        self.managed_agents.push(agent);
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Defaults to the built-in templates.
    pub fn prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Defaults to a fresh [`Sandbox`] configured from the settings.
    pub fn sandbox(mut self, sandbox: Box<dyn ScriptSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Defaults to a [`TracingLogger`].
    pub fn logger(mut self, logger: Arc<dyn AgentLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn StepHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Final answers that do not validate against `schema` are rejected.
    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn build(self) -> AgentResult<CodeAgent> {
        self.settings.validate()?;

        // ── Step 1: a run must be able to end ──
        if !self.udfs.iter().any(|udf| udf.as_stopping().is_some()) {
            return Err(AgentError::udf_not_found(
                "The CodeAgent requires at least one stopping UDF to be present in the udfs list.",
            ));
        }

        // ── Step 2: one delegation UDF per managed agent ──
        let mut udfs = self.udfs;
        for agent in &self.managed_agents {
            udfs.push(Arc::new(CallAgentUdf::new(
                agent.name(),
                agent.description(),
                agent.output_schema().cloned(),
            )));
        }

        // ── Step 3: names must be unique ──
        let mut seen = HashSet::new();
        if !udfs.iter().all(|udf| seen.insert(udf.name().to_string())) {
            return Err(AgentError::validation("UDF names must be unique."));
        }

        // ── Step 4: flag undocumented primitive inputs ──
        let warnings = undocumented_primitive_warnings(&udfs);
        for warning in &warnings {
            warn!(agent = %self.name, "{warning}");
        }

        let prompts = match self.prompts {
            Some(prompts) => prompts,
            None => PromptTemplates::builtin()?,
        };
        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(TracingLogger::new(self.name.clone())));
        let ctx = Arc::new(AgentContext::new(
            self.name.clone(),
            udfs,
            self.managed_agents,
            self.settings.planning_interval,
        ));

        // ── Step 5: expose every UDF to scripts ──
        let mut sandbox = self.sandbox.unwrap_or_else(|| {
            Box::new(Sandbox::with_options(SandboxOptions {
                call_result_max_length: self.settings.call_result_max_length,
                indented: self.settings.indent_call_results,
                max_operations: self.settings.max_operations,
            }))
        });
        for udf in ctx.udfs() {
            sandbox.register(
                udf.name(),
                Arc::new(UdfHost {
                    ctx: Arc::clone(&ctx),
                    name: udf.name().to_string(),
                }),
            );
        }

        debug!(
            agent = %self.name,
            udfs = ctx.udfs().len(),
            managed_agents = ctx.managed_agents().len(),
            "code agent built"
        );

        Ok(CodeAgent {
            name: self.name,
            description: self.description,
            model: self.model,
            ctx,
            sandbox,
            prompts,
            settings: self.settings,
            output_schema: self.output_schema,
            logger,
            hooks: self.hooks,
            warnings,
            task: String::new(),
        })
    }
}

fn undocumented_primitive_warnings(udfs: &[Arc<dyn Udf>]) -> Vec<String> {
    let mut warnings = Vec::new();
    for udf in udfs {
        udf.input_schema().walk_primitives(&mut |schema, path| {
            if schema.description.is_none() {
                warnings.push(format!(
                    "UDF {} has an input schema {path} that is a primitive type but has no description.",
                    udf.name()
                ));
            }
        });
    }
    warnings
}
