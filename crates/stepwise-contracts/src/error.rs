//! Error taxonomy for the stepwise runtime.
//!
//! Every recoverable failure inside the agent loop is an `AgentError`: a
//! message plus a stable `ErrorCode`. Errors are attached to the action step
//! that produced them and fed back to the model as a retry prompt, so the
//! message text is part of the model-facing contract.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of an `AgentError`.
///
/// Serialized in SCREAMING_SNAKE_CASE, e.g. `"UDF_NOT_FOUND"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    UdfNotFound,
    ScriptExecutionFailed,
    ManagedAgentError,
    UdfExecutionError,
    MaxStepsReached,
    ModelOutputError,
    ParsingError,
    InvalidCodePattern,
    InvalidUdfInputSchema,
    PrematureTerminate,
    InvalidInput,
    ConfigError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::UdfNotFound => "UDF_NOT_FOUND",
            ErrorCode::ScriptExecutionFailed => "SCRIPT_EXECUTION_FAILED",
            ErrorCode::ManagedAgentError => "MANAGED_AGENT_ERROR",
            ErrorCode::UdfExecutionError => "UDF_EXECUTION_ERROR",
            ErrorCode::MaxStepsReached => "MAX_STEPS_REACHED",
            ErrorCode::ModelOutputError => "MODEL_OUTPUT_ERROR",
            ErrorCode::ParsingError => "PARSING_ERROR",
            ErrorCode::InvalidCodePattern => "INVALID_CODE_PATTERN",
            ErrorCode::InvalidUdfInputSchema => "INVALID_UDF_INPUT_SCHEMA",
            ErrorCode::PrematureTerminate => "PREMATURE_TERMINATE",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unified, model-visible error type of the agent loop.
///
/// JSON shape: `{"message": "...", "code": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AgentError {
    pub message: String,
    pub code: ErrorCode,
}

impl AgentError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn udf_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UdfNotFound, message)
    }

    pub fn script_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ScriptExecutionFailed, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }
}

/// Convenience alias used throughout the stepwise crates.
pub type AgentResult<T> = Result<T, AgentError>;

/// Failure raised from inside a UDF's `call` or hooks.
///
/// `kind` mirrors the error class the model sees (`Error`, `TypeError`,
/// `ValidationError`, ...); the agent folds it into one descriptive
/// `UDF_EXECUTION_ERROR` message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct UdfError {
    pub kind: String,
    pub message: String,
}

impl UdfError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind("Error", message)
    }

    pub fn with_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<AgentError> for UdfError {
    fn from(err: AgentError) -> Self {
        Self::with_kind("AgentError", err.message)
    }
}

/// What escapes `CodeAgent::run`.
///
/// `Agent` carries taxonomized failures that cannot be recorded on a step
/// (construction, planning). `Internal` carries anything unanticipated; it
/// is never retried by the loop.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl RunError {
    pub fn internal(reason: impl Into<String>) -> Self {
        RunError::Internal {
            reason: reason.into(),
        }
    }
}
