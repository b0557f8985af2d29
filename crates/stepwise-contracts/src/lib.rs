//! # stepwise-contracts
//!
//! Shared types and collaborator contracts for the stepwise code-agent runtime.
//!
//! All crates in the workspace import from here. No agent logic lives in this
//! crate, only data definitions, the error taxonomy, and the logger contract.

pub mod agent;
pub mod callable;
pub mod error;
pub mod logger;
pub mod message;
pub mod model;

#[cfg(test)]
mod tests {
    use super::*;
    use agent::RunId;
    use callable::CallableResult;
    use error::{AgentError, ErrorCode, RunError, UdfError};
    use message::{ChatMessage, Observation, Role};
    use model::ChatRequest;

    // ── AgentError ───────────────────────────────────────────────────────────

    #[test]
    fn agent_error_serializes_as_message_and_code() {
        let err = AgentError::udf_not_found("UDF search not found");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "message": "UDF search not found", "code": "UDF_NOT_FOUND" })
        );
    }

    #[test]
    fn agent_error_display_is_the_bare_message() {
        let err = AgentError::new(ErrorCode::MaxStepsReached, "Reached max steps");
        assert_eq!(err.to_string(), "Reached max steps");
    }

    #[test]
    fn error_code_as_str_matches_serde() {
        for code in [
            ErrorCode::ValidationError,
            ErrorCode::ScriptExecutionFailed,
            ErrorCode::InvalidUdfInputSchema,
            ErrorCode::PrematureTerminate,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json.as_str(), Some(code.as_str()));
        }
    }

    #[test]
    fn agent_error_deserializes() {
        let err: AgentError =
            serde_json::from_str(r#"{"message":"boom","code":"SCRIPT_EXECUTION_FAILED"}"#)
                .unwrap();
        assert_eq!(err.code, ErrorCode::ScriptExecutionFailed);
        assert_eq!(err.message, "boom");
    }

    // ── UdfError / RunError ──────────────────────────────────────────────────

    #[test]
    fn udf_error_display_includes_kind() {
        assert_eq!(UdfError::new("boom").to_string(), "Error: boom");
        assert_eq!(
            UdfError::with_kind("TypeError", "x is not a function").to_string(),
            "TypeError: x is not a function"
        );
    }

    #[test]
    fn run_error_wraps_agent_error_transparently() {
        let err: RunError = AgentError::validation("UDF names must be unique.").into();
        assert_eq!(err.to_string(), "UDF names must be unique.");
        assert!(RunError::internal("lost").to_string().contains("lost"));
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    #[test]
    fn chat_message_omits_empty_images() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "hi" }));
    }

    #[test]
    fn observation_is_tagged_by_type() {
        let obs: Observation = serde_json::from_value(serde_json::json!({
            "type": "text",
            "text": "42",
            "source": "calculator"
        }))
        .unwrap();
        assert_eq!(
            obs,
            Observation::Text {
                text: "42".to_string(),
                context: None,
                source: Some("calculator".to_string()),
            }
        );
    }

    #[test]
    fn chat_request_with_stop_collects_sequences() {
        let req = ChatRequest::new(vec![ChatMessage::system("s")]).with_stop(["<end_code>"]);
        assert_eq!(req.stop, vec!["<end_code>".to_string()]);
        assert_eq!(req.messages[0].role, Role::System);
    }

    // ── CallableResult ───────────────────────────────────────────────────────

    #[test]
    fn callable_result_uses_camel_case_keys() {
        let result = CallableResult::new("f", serde_json::json!("r"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "returnValue": "r", "returnValueSummary": null, "callable": "f" })
        );
    }

    // ── RunId ────────────────────────────────────────────────────────────────

    #[test]
    fn run_id_new_produces_unique_values() {
        let ids: std::collections::HashSet<String> =
            (0..50).map(|_| RunId::new().to_string()).collect();
        assert_eq!(ids.len(), 50);
    }
}
