//! Prompt templates and `{{placeholder}}` rendering.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use stepwise_contracts::error::{AgentError, AgentResult};

const BUILTIN_CODE_AGENT: &str = include_str!("../prompts/code_agent.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningPrompts {
    pub initial_facts: String,
    pub initial_plan: String,
    pub update_facts_pre_messages: String,
    pub update_facts_post_messages: String,
    pub update_plan_pre_messages: String,
    pub update_plan_post_messages: String,
    /// Inserted into the plan prompts when the agent manages sub-agents.
    pub team_members: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedAgentPrompts {
    /// Frames a manager's request for the sub-agent.
    pub task: String,
    /// Frames the sub-agent's answer for the manager.
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswerPrompts {
    pub pre_messages: String,
    pub post_messages: String,
}

/// Every prompt the code agent sends besides memory replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub system_prompt: String,
    pub planning: PlanningPrompts,
    pub managed_agent: ManagedAgentPrompts,
    pub final_answer: FinalAnswerPrompts,
}

impl PromptTemplates {
    /// The templates shipped with the crate.
    pub fn builtin() -> AgentResult<Self> {
        Self::from_toml_str(BUILTIN_CODE_AGENT)
    }

    pub fn from_toml_str(s: &str) -> AgentResult<Self> {
        let templates: PromptTemplates = toml::from_str(s)
            .map_err(|e| AgentError::config(format!("failed to parse prompt templates TOML: {e}")))?;
        debug!(
            system_prompt_len = templates.system_prompt.len(),
            "prompt templates loaded"
        );
        Ok(templates)
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::config(format!(
                "failed to read prompt templates file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }
}

/// Substitute `{{name}}` placeholders. Whitespace inside the braces is
/// ignored; placeholders without a value are kept as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
