//! Loop and sandbox tuning knobs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use stepwise_contracts::error::{AgentError, AgentResult};

/// Settings for one `CodeAgent`, deserialized from TOML.
///
/// Every field is optional in the document; missing keys take the defaults
/// below.
///
/// ```toml
/// max_steps = 15
/// planning_interval = 3
/// call_result_max_length = 4000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    /// Action steps before the loop gives up with `MAX_STEPS_REACHED`.
    pub max_steps: u32,

    /// Re-plan after every step where `step_number % interval == 1`.
    pub planning_interval: Option<u32>,

    /// Run a planning step before the first action step.
    pub plan_first: bool,

    /// Cap on each rendered call result in the script output block.
    pub call_result_max_length: usize,

    /// Cap on the console output fed back as an observation.
    pub observation_max_length: usize,

    /// Pretty-print call results instead of compact JSON.
    pub indent_call_results: bool,

    /// Evaluation steps one script may take.
    pub max_operations: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            planning_interval: None,
            plan_first: false,
            call_result_max_length: 2000,
            observation_max_length: 2000,
            indent_call_results: true,
            max_operations: 1_000_000,
        }
    }
}

impl AgentSettings {
    /// Parse settings from a TOML document.
    ///
    /// Returns `CONFIG_ERROR` when the document is malformed or a value is
    /// out of range.
    pub fn from_toml_str(s: &str) -> AgentResult<Self> {
        let settings: AgentSettings = toml::from_str(s)
            .map_err(|e| AgentError::config(format!("failed to parse agent settings TOML: {e}")))?;
        settings.validate()?;
        debug!(
            max_steps = settings.max_steps,
            planning_interval = ?settings.planning_interval,
            "agent settings loaded"
        );
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::config(format!(
                "failed to read agent settings file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.max_steps == 0 {
            return Err(AgentError::config("max_steps must be at least 1"));
        }
        if self.planning_interval == Some(0) {
            return Err(AgentError::config("planning_interval must be at least 1 when set"));
        }
        if self.call_result_max_length == 0 || self.observation_max_length == 0 {
            return Err(AgentError::config("truncation lengths must be positive"));
        }
        if self.max_operations == 0 {
            return Err(AgentError::config("max_operations must be positive"));
        }
        Ok(())
    }
}
