//! # stepwise-config
//!
//! TOML configuration for the stepwise code agent.
//!
//! - [`AgentSettings`]: step budget, planning cadence, truncation limits and
//!   the sandbox operation budget.
//! - [`PromptTemplates`]: the system, planning, managed-agent and
//!   final-answer prompts. A default set ships embedded in the crate
//!   (`prompts/code_agent.toml`); [`render`] fills their `{{name}}`
//!   placeholders.
//!
//! ```rust,ignore
//! use stepwise_config::{AgentSettings, PromptTemplates};
//!
//! let settings = AgentSettings::from_file(Path::new("agent.toml"))?;
//! let prompts = PromptTemplates::builtin()?;
//! ```

pub mod prompts;
pub mod settings;

pub use prompts::{render, FinalAnswerPrompts, ManagedAgentPrompts, PlanningPrompts, PromptTemplates};
pub use settings::AgentSettings;

#[cfg(test)]
mod tests {
    use stepwise_contracts::error::ErrorCode;

    use super::*;

    // ── AgentSettings ─────────────────────────────────────────────────────────

    #[test]
    fn empty_document_yields_defaults() {
        let settings = AgentSettings::from_toml_str("").unwrap();
        assert_eq!(settings, AgentSettings::default());
        assert_eq!(settings.max_steps, 10);
        assert_eq!(settings.call_result_max_length, 2000);
        assert!(settings.indent_call_results);
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let settings = AgentSettings::from_toml_str(
            r#"
            max_steps = 4
            planning_interval = 2
            indent_call_results = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.max_steps, 4);
        assert_eq!(settings.planning_interval, Some(2));
        assert!(!settings.indent_call_results);
        assert_eq!(settings.observation_max_length, 2000);
    }

    #[test]
    fn malformed_settings_are_config_errors() {
        let err = AgentSettings::from_toml_str("max_steps = [[[").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
        assert!(err.message.contains("failed to parse agent settings TOML"));

        let err = AgentSettings::from_toml_str("max_stepz = 3").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = AgentSettings::from_toml_str("max_steps = 0").unwrap_err();
        assert_eq!(err.message, "max_steps must be at least 1");

        let err = AgentSettings::from_toml_str("planning_interval = 0").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }

    #[test]
    fn missing_settings_file_is_a_config_error() {
        let err = AgentSettings::from_file(std::path::Path::new("/nonexistent/agent.toml"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
        assert!(err.message.contains("/nonexistent/agent.toml"));
    }

    // ── PromptTemplates ───────────────────────────────────────────────────────

    #[test]
    fn builtin_templates_parse() {
        let prompts = PromptTemplates::builtin().unwrap();
        assert!(prompts.system_prompt.starts_with("You are an expert javascript"));
        assert!(prompts.system_prompt.contains("{{udfs}}"));
        assert!(prompts.system_prompt.contains("{{description}}"));
        assert!(prompts.planning.initial_plan.contains("{{answer_facts}}"));
        assert!(prompts.planning.update_plan_post_messages.contains("{{remaining_steps}}"));
        assert!(prompts.managed_agent.report.contains("{{final_answer}}"));
    }

    #[test]
    fn system_prompt_states_the_script_subset() {
        let prompts = PromptTemplates::builtin().unwrap();
        for supported in ["Map, Set, Date", "RegExp", "classes"] {
            assert!(prompts.system_prompt.contains(supported), "{supported}");
        }
        for missing in ["getters and setters", "generators", "look-around"] {
            assert!(prompts.system_prompt.contains(missing), "{missing}");
        }
    }

    #[test]
    fn templates_missing_a_section_are_rejected() {
        let err = PromptTemplates::from_toml_str("system_prompt = 'hi'").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }

    // ── render ────────────────────────────────────────────────────────────────

    #[test]
    fn render_substitutes_known_placeholders() {
        let out = render(
            "Hello {{name}}, task: {{ task }}.",
            &[("name", "scout"), ("task", "count")],
        );
        assert_eq!(out, "Hello scout, task: count.");
    }

    #[test]
    fn render_keeps_unknown_and_unterminated_placeholders() {
        assert_eq!(render("a {{missing}} b", &[]), "a {{missing}} b");
        assert_eq!(render("open {{never", &[("never", "x")]), "open {{never");
    }

    #[test]
    fn render_does_not_rescan_substituted_values() {
        let out = render("{{a}}", &[("a", "{{b}}"), ("b", "oops")]);
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn managed_agent_templates_render() {
        let prompts = PromptTemplates::builtin().unwrap();
        let task = render(
            &prompts.managed_agent.task,
            &[("name", "researcher"), ("task", "find the capital")],
        );
        assert!(task.starts_with("You're a helpful agent named 'researcher'."));
        assert!(task.contains("Task:\nfind the capital\n---"));

        let report = render(
            &prompts.managed_agent.report,
            &[("name", "researcher"), ("final_answer", "Paris")],
        );
        assert_eq!(
            report,
            "Here is the final answer from your managed agent 'researcher':\nParis"
        );
    }
}
