//! Reference tasks.
//!
//! Each task is a self-contained module that builds a real `CodeAgent`
//! around a `ScriptedModel`, runs it, and prints a short report. The
//! returned value carries a [`ScenarioOutcome`] for inspection or replay,
//! plus whatever task-specific state (datasheet rows, notes, sub-agent
//! memory) the run left behind.

use serde_json::Value;
use stepwise_memory::AgentMemory;

pub mod data_collection;
pub mod delegation;
pub mod replanning;
pub mod simple_math;

/// What a reference task produced.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub answer: Option<Value>,
    /// The (top-level) agent's memory after the run.
    pub memory: AgentMemory,
    /// Completions the scripted model served.
    pub model_calls: usize,
}
