//! # stepwise-memory
//!
//! The memory model of the stepwise runtime: an ordered, append-only log of
//! typed steps (system prompt, task, planning, action), each convertible into
//! role-tagged chat messages in full or summary fidelity.
//!
//! The full rendering is the prompt the model sees on every step. The summary
//! rendering drops raw model output and plan text; it feeds re-planning and
//! compact replay logs.

pub mod memory;
pub mod step;

pub use memory::AgentMemory;
pub use step::{
    observation_to_message, ActionStep, MemoryStep, MessageOptions, PlanningStep,
    SystemPromptStep, TaskStep,
};
