//! The stateful script sandbox.
//!
//! A [`Sandbox`] owns a global scope that outlives individual scripts. Each
//! script runs as the body of an async function: its `let`/`const`/`var`
//! bindings vanish afterwards, while bare assignments land in the global
//! scope and stay visible to later scripts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use stepwise_contracts::callable::CallableResult;
use stepwise_contracts::error::{AgentError, AgentResult};

use crate::builtins::install_globals;
use crate::console::BufferConsole;
use crate::format::{format_script_call_results, FormatOptions, MAX_LENGTH_TRUNCATE_CONTENT};
use crate::interpreter::{Abrupt, Interpreter};
use crate::parser::parse_program;
use crate::scope::Scope;
use crate::value::{error_message, lock, strict_equals, to_json, Callable, Value};

/// A host capability a script can call as an async function.
///
/// Arguments arrive as JSON. The returned [`CallableResult`] carries the value
/// handed back to the script; its `callable` field is overwritten with the
/// registered name.
#[async_trait]
pub trait HostFunction: Send + Sync {
    async fn invoke(&self, args: Vec<serde_json::Value>) -> Result<CallableResult, AgentError>;
}

#[async_trait]
impl<F, Fut> HostFunction for F
where
    F: Fn(Vec<serde_json::Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CallableResult, AgentError>> + Send,
{
    async fn invoke(&self, args: Vec<serde_json::Value>) -> Result<CallableResult, AgentError> {
        (self)(args).await
    }
}

/// What one script execution produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    /// Host calls made by this script, in call order.
    pub calls: Vec<CallableResult>,
    /// The script's `return` value; `None` when it returned `undefined`.
    pub return_value: Option<serde_json::Value>,
    /// Console output followed by the rendered call results.
    pub output: String,
}

/// Executes scripts against a set of registered host functions.
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    fn register(&mut self, name: &str, function: Arc<dyn HostFunction>);

    async fn execute_script(&mut self, script: &str) -> AgentResult<ScriptOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxOptions {
    pub call_result_max_length: usize,
    /// Pretty-print call results in the output block.
    pub indented: bool,
    /// Evaluation steps a single script may take before it is aborted.
    pub max_operations: u64,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            call_result_max_length: MAX_LENGTH_TRUNCATE_CONTENT,
            indented: true,
            max_operations: 1_000_000,
        }
    }
}

pub struct Sandbox {
    globals: Scope,
    hosts: HashMap<String, Arc<dyn HostFunction>>,
    call_history: Vec<Vec<CallableResult>>,
    options: SandboxOptions,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_options(SandboxOptions::default())
    }

    pub fn with_options(options: SandboxOptions) -> Self {
        let globals = Scope::global();
        install_globals(&globals);
        Self {
            globals,
            hosts: HashMap::new(),
            call_history: Vec::new(),
            options,
        }
    }

    /// One bucket of calls per executed script, oldest first.
    pub fn call_history(&self) -> &[Vec<CallableResult>] {
        &self.call_history
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Names currently bound in the persistent global scope.
    pub fn global_names(&self) -> Vec<String> {
        self.globals.names()
    }

    fn failed(message: impl std::fmt::Display) -> AgentError {
        AgentError::script_failed(format!("Script execution failed: {message}"))
    }
}

#[async_trait]
impl ScriptSandbox for Sandbox {
    fn register(&mut self, name: &str, function: Arc<dyn HostFunction>) {
        self.hosts.insert(name.to_string(), function);
        self.globals
            .declare(name, Value::function(Callable::Host(name.to_string())), true);
    }

    async fn execute_script(&mut self, script: &str) -> AgentResult<ScriptOutput> {
        // ── Step 1: open this script's history bucket ───────────────────────
        self.call_history.push(Vec::new());
        let existing = self.globals.names();

        // ── Step 2: parse ───────────────────────────────────────────────────
        let program = parse_program(script).map_err(|err| {
            debug!(line = err.line, error = %err, "script failed to parse");
            Self::failed(&err)
        })?;

        // ── Step 3: evaluate ────────────────────────────────────────────────
        let interpreter = Interpreter::new(
            self.hosts.clone(),
            BufferConsole::new(),
            self.options.max_operations,
        );
        let completion = interpreter.run(&program, &self.globals).await;

        let recorded = std::mem::take(&mut *lock(&interpreter.calls));
        if let Some(bucket) = self.call_history.last_mut() {
            bucket.extend(recorded.iter().map(|(result, _)| result.clone()));
        }

        for reason in interpreter.unhandled_rejections() {
            warn!(reason = %error_message(&reason), "unhandled promise rejection in script");
            interpreter
                .console
                .log(&format!("UnhandledPromiseRejection: {}", error_message(&reason)));
        }

        let value = match completion {
            Ok(value) => value,
            Err(Abrupt::Throw(thrown)) => {
                let message = error_message(&thrown);
                debug!(error = %message, "script threw");
                return Err(Self::failed(message));
            }
            Err(Abrupt::ShortCircuit) => Value::Undefined,
        };
        let return_value = to_json(&value).map_err(Self::failed)?;

        // ── Step 4: label calls with the new globals that captured them ─────
        let new_names: Vec<String> = self
            .globals
            .names()
            .into_iter()
            .filter(|name| !existing.contains(name))
            .collect();
        let new_values: Vec<(String, Value)> = new_names
            .into_iter()
            .filter_map(|name| self.globals.lookup(&name).map(|value| (name, value)))
            .collect();
        let labels: Vec<Option<&str>> = recorded
            .iter()
            .map(|(_, returned)| {
                new_values
                    .iter()
                    .find(|(_, value)| strict_equals(value, returned))
                    .map(|(name, _)| name.as_str())
            })
            .collect();
        let calls: Vec<CallableResult> = recorded.iter().map(|(result, _)| result.clone()).collect();

        let format_options = FormatOptions {
            indented: self.options.indented,
            call_result_max_length: self.options.call_result_max_length,
        };
        let rendered = format_script_call_results(&labels, &calls, &format_options);
        if !rendered.is_empty() {
            interpreter.console.log(&rendered);
        }

        debug!(calls = calls.len(), "script finished");
        Ok(ScriptOutput {
            calls,
            return_value,
            output: interpreter.console.output(),
        })
    }
}
