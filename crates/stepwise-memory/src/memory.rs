//! `AgentMemory`: the ordered step log of one agent.

use serde::Serialize;
use tracing::debug;

use stepwise_contracts::{
    logger::{AgentLogger, LogLevel},
    message::ChatMessage,
};

use crate::step::{ActionStep, MemoryStep, MessageOptions, PlanningStep, SystemPromptStep};

/// The step log of an agent.
///
/// Steps are append-only and kept in creation order. The system prompt is
/// held apart from `steps` so that `reset` can clear history while keeping it.
#[derive(Debug, Clone, Serialize)]
pub struct AgentMemory {
    pub system_prompt: SystemPromptStep,
    pub steps: Vec<MemoryStep>,
}

impl AgentMemory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: SystemPromptStep {
                system_prompt: system_prompt.into(),
            },
            steps: Vec::new(),
        }
    }

    /// Clear all steps. The system prompt persists.
    pub fn reset(&mut self) {
        self.steps.clear();
    }

    pub fn push(&mut self, step: MemoryStep) {
        debug!(index = self.steps.len(), "memory step appended");
        self.steps.push(step);
    }

    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = SystemPromptStep {
            system_prompt: system_prompt.into(),
        };
    }

    /// Render the system prompt followed by every step.
    ///
    /// Input-message echoes are never included; this is what the model sees.
    pub fn write_to_messages(&self, summary_mode: bool) -> Vec<ChatMessage> {
        let options = MessageOptions {
            summary_mode,
            show_model_input_messages: false,
        };
        let system = MemoryStep::SystemPrompt(self.system_prompt.clone());
        std::iter::once(&system)
            .chain(self.steps.iter())
            .flat_map(|step| step.to_messages(options))
            .collect()
    }

    /// Every step rendered in summary mode, for compact logging.
    pub fn succinct_steps(&self) -> Vec<ChatMessage> {
        self.steps
            .iter()
            .flat_map(|step| step.to_messages(MessageOptions::summary()))
            .collect()
    }

    pub fn action_steps(&self) -> impl DoubleEndedIterator<Item = &ActionStep> {
        self.steps.iter().filter_map(|step| match step {
            MemoryStep::Action(action) => Some(action),
            _ => None,
        })
    }

    pub fn planning_steps(&self) -> impl Iterator<Item = &PlanningStep> {
        self.steps.iter().filter_map(|step| match step {
            MemoryStep::Planning(planning) => Some(planning),
            _ => None,
        })
    }

    pub fn last_action_step(&self) -> Option<&ActionStep> {
        self.action_steps().next_back()
    }

    /// Reconstruct the run through `logger`.
    ///
    /// In non-detailed mode only task and step headers plus model outputs are
    /// logged; detailed mode adds system prompts and model inputs.
    pub fn replay(&self, logger: &dyn AgentLogger, detailed: bool) {
        logger.log(LogLevel::Info, "Replaying the agent's steps:");

        for step in &self.steps {
            match step {
                MemoryStep::SystemPrompt(step) => {
                    if detailed {
                        logger.log_markdown(Some("System prompt"), &step.system_prompt);
                    }
                }
                MemoryStep::Task(step) => logger.log_task(&step.task),
                MemoryStep::Action(step) => {
                    logger.log_rule(&format!("Step {}", step.step_number), LogLevel::Info);
                    if detailed {
                        logger.log_messages(step.model_input_messages.as_deref());
                    }
                    logger.log_markdown(
                        Some("Agent output:"),
                        step.model_output.as_deref().unwrap_or_default(),
                    );
                }
                MemoryStep::Planning(step) => {
                    logger.log_rule("Planning step", LogLevel::Info);
                    if detailed {
                        logger.log_messages(Some(&step.model_input_messages));
                    }
                    logger.log_markdown(
                        Some("Agent output:"),
                        &format!("{}\n{}", step.facts, step.plan),
                    );
                }
            }
        }
    }
}
