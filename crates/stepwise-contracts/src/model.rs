//! Request and response types exchanged with the chat-completion provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::ChatMessage;

/// A chat-completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Stop sequences. Generation halts before emitting any of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Provider-specific structured-output hint, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub usage: TokenUsage,
}

/// A chat-completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

impl ChatResponse {
    /// An assistant response with zeroed usage.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            message: ChatMessage::assistant(content),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Provider-level failure. The agent reclassifies it as `MODEL_OUTPUT_ERROR`.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model request failed: {reason}")]
    Request { reason: String },

    #[error("model response did not match the requested schema: {reason}")]
    InvalidResponse { reason: String },
}
