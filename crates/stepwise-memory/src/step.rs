//! Memory step variants and their chat-message rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stepwise_contracts::{
    error::AgentError,
    message::{ChatMessage, Observation},
};

/// Retry instruction appended after every recorded step error.
pub const RETRY_INSTRUCTION: &str = "Now let's retry: take care not to repeat previous errors! If you have retried several times, try a completely different approach.\n";

/// Rendering fidelity for `MemoryStep::to_messages`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageOptions {
    /// Drop system prompts, raw model output, and plan text.
    pub summary_mode: bool,
    /// Echo each action step's input messages as one system message.
    pub show_model_input_messages: bool,
}

impl MessageOptions {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn summary() -> Self {
        Self {
            summary_mode: true,
            show_model_input_messages: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemPromptStep {
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStep {
    pub task: String,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningStep {
    pub model_input_messages: Vec<ChatMessage>,
    pub facts: String,
    pub plan: String,
    pub model_output_message_facts: ChatMessage,
    pub model_output_message_plan: ChatMessage,
}

/// One iteration of the agent loop.
///
/// Mutable until `end_time` is stamped by `finish`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionStep {
    pub step_number: u32,
    pub model_input_messages: Option<Vec<ChatMessage>>,
    pub model_output_message: Option<ChatMessage>,
    pub model_output: Option<String>,
    pub observations: Vec<Observation>,
    pub action_output: Option<serde_json::Value>,
    pub error: Option<AgentError>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl ActionStep {
    pub fn new(step_number: u32) -> Self {
        Self {
            step_number,
            model_input_messages: None,
            model_output_message: None,
            model_output: None,
            observations: Vec::new(),
            action_output: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
        }
    }

    /// Stamp `end_time` and `duration_ms`.
    pub fn finish(&mut self) {
        let end = Utc::now();
        self.duration_ms = Some((end - self.start_time).num_milliseconds());
        self.end_time = Some(end);
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// A closed set of step kinds recorded in `AgentMemory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryStep {
    SystemPrompt(SystemPromptStep),
    Task(TaskStep),
    Planning(PlanningStep),
    Action(ActionStep),
}

impl MemoryStep {
    /// Linearize this step into role-tagged chat messages.
    pub fn to_messages(&self, options: MessageOptions) -> Vec<ChatMessage> {
        match self {
            MemoryStep::SystemPrompt(step) => {
                if options.summary_mode {
                    Vec::new()
                } else {
                    vec![ChatMessage::system(step.system_prompt.clone())]
                }
            }
            MemoryStep::Task(step) => vec![ChatMessage::user(format!("New task:\n{}", step.task))],
            MemoryStep::Planning(step) => {
                let mut messages = vec![ChatMessage::assistant(format!(
                    "[FACTS LIST]:\n{}",
                    step.facts.trim()
                ))];
                // Plan text is hidden from the re-planner so it does not anchor on it.
                if !options.summary_mode {
                    messages.push(ChatMessage::assistant(format!(
                        "[PLAN]:\n{}",
                        step.plan.trim()
                    )));
                }
                messages
            }
            MemoryStep::Action(step) => {
                let mut messages = Vec::new();

                if options.show_model_input_messages {
                    if let Some(inputs) = &step.model_input_messages {
                        let echoed: Vec<&str> = inputs.iter().map(|m| m.content.as_str()).collect();
                        messages.push(ChatMessage::system(echoed.join("\n")));
                    }
                }

                if !options.summary_mode {
                    if let Some(output) = step.model_output.as_deref().filter(|o| !o.is_empty()) {
                        messages.push(ChatMessage::assistant(output.trim()));
                    }
                }

                messages.extend(step.observations.iter().map(observation_to_message));

                if let Some(error) = &step.error {
                    messages.push(ChatMessage::user(format!(
                        "Error:\n{}\n{RETRY_INSTRUCTION}",
                        error.message
                    )));
                }

                messages
            }
        }
    }
}

/// Render one observation as a user message.
///
/// Context and source are suffixed on their own lines.
pub fn observation_to_message(observation: &Observation) -> ChatMessage {
    fn suffix(context: &Option<String>, source: &Option<String>) -> String {
        let mut out = String::new();
        if let Some(context) = context {
            out.push_str(&format!("\nContext: {context}"));
        }
        if let Some(source) = source {
            out.push_str(&format!("\nSource: {source}"));
        }
        out
    }

    match observation {
        Observation::Text {
            text,
            context,
            source,
        } => ChatMessage::user(format!("Observation:\n{text}{}", suffix(context, source))),
        Observation::Image {
            image,
            context,
            source,
        } => {
            let mut message = ChatMessage::user(format!(
                "Observation Image:{}",
                suffix(context, source)
            ));
            message.images.push(image.clone());
            message
        }
    }
}
