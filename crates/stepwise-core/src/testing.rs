//! Test doubles shared by the crate's unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use stepwise_contracts::model::{ChatRequest, ChatResponse, ModelError};

use crate::traits::ChatModel;

/// Replays canned completions in order and records every request.
pub(crate) struct MockModel {
    responses: Mutex<VecDeque<String>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockModel {
    pub(crate) fn new(responses: &[&str]) -> (Arc<Self>, Arc<Mutex<Vec<ChatRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let model = Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            requests: Arc::clone(&requests),
        });
        (model, requests)
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(content) => Ok(ChatResponse::assistant(content)),
            None => Err(ModelError::Request {
                reason: "no scripted response left".into(),
            }),
        }
    }
}

/// A model answer wrapping `code` in a js fence.
pub(crate) fn js(code: &str) -> String {
    format!("// Thought: next step\n```js\n{code}\n```")
}
