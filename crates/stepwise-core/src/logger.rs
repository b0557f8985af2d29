//! `AgentLogger` backed by `tracing` events.

use tracing::{debug, error, info, warn};

use stepwise_contracts::{
    logger::{AgentLogger, LogLevel},
    message::ChatMessage,
};

/// Emits every agent log call as a `tracing` event on the
/// `stepwise::agent` target, tagged with the agent's name.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    agent: String,
}

impl TracingLogger {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
        }
    }
}

impl AgentLogger for TracingLogger {
    fn log_task(&self, content: &str) {
        info!(target: "stepwise::agent", agent = %self.agent, "new task: {content}");
    }

    fn log_rule(&self, title: &str, level: LogLevel) {
        self.log(level, &format!("━━ {title} ━━"));
    }

    fn log(&self, level: LogLevel, content: &str) {
        match level {
            LogLevel::Debug => debug!(target: "stepwise::agent", agent = %self.agent, "{content}"),
            LogLevel::Info => info!(target: "stepwise::agent", agent = %self.agent, "{content}"),
            LogLevel::Warning => warn!(target: "stepwise::agent", agent = %self.agent, "{content}"),
            LogLevel::Error => error!(target: "stepwise::agent", agent = %self.agent, "{content}"),
        }
    }

    fn log_markdown(&self, title: Option<&str>, content: &str) {
        match title {
            Some(title) => {
                info!(target: "stepwise::agent", agent = %self.agent, title, "{content}")
            }
            None => info!(target: "stepwise::agent", agent = %self.agent, "{content}"),
        }
    }

    fn log_messages(&self, messages: Option<&[ChatMessage]>) {
        for message in messages.unwrap_or_default() {
            debug!(
                target: "stepwise::agent",
                agent = %self.agent,
                role = ?message.role,
                "{}",
                message.content
            );
        }
    }
}
