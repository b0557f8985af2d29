//! A `ChatModel` that replays canned completions.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use tracing::debug;

use stepwise_contracts::model::{ChatRequest, ChatResponse, ModelError};
use stepwise_core::ChatModel;

/// Answers each request with the next canned completion, in order.
///
/// Every request is recorded so callers can inspect what the agent sent.
/// Once the script is exhausted every request fails with
/// `ModelError::Request`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Completions not yet handed out.
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        match next {
            Some(content) => {
                debug!(len = content.len(), "scripted completion served");
                Ok(ChatResponse::assistant(content))
            }
            None => Err(ModelError::Request {
                reason: "scripted model has no responses left".to_string(),
            }),
        }
    }
}

/// A model answer: a thought line and `code` in a js fence.
pub fn code_answer(thought: &str, code: &str) -> String {
    format!("// Thought: {thought}\n```js\n{code}\n```")
}
