//! The host logger contract.
//!
//! The agent loop and memory replay write human-readable progress through an
//! `AgentLogger`. Nothing the logger returns is consumed by the core.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

/// Side-effecting sink for agent progress.
pub trait AgentLogger: Send + Sync {
    /// Announce a new task.
    fn log_task(&self, content: &str);

    /// Print a titled horizontal rule, e.g. `Step 3`.
    fn log_rule(&self, title: &str, level: LogLevel);

    fn log(&self, level: LogLevel, content: &str);

    /// Print a block of markdown with an optional heading.
    fn log_markdown(&self, title: Option<&str>, content: &str);

    /// Dump a message list. `None` is a no-op.
    fn log_messages(&self, messages: Option<&[ChatMessage]>);
}
