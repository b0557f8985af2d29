//! Task 3: Delegation
//!
//! A manager agent answers a geography question by delegating to a
//! researcher sub-agent. The researcher owns the `lookupCapital` UDF; the
//! manager only sees the generated `callResearcher` UDF.
//!
//! Walk-through:
//!   1. The manager's script calls `callResearcher` with a sub-task
//!   2. The researcher runs its own loop: lookup, then `finalAnswer`
//!   3. The researcher's answer comes back framed as a report
//!   4. The manager reads the report and gives the final answer

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::error::{RunError, UdfError};
use stepwise_core::{udf::FinalAnswerUdf, AgentContext, CodeAgent, ManagedCodeAgent, Udf};
use stepwise_memory::AgentMemory;
use stepwise_schema::{Property, Schema};

use crate::{
    mock_data::capital_of,
    scenarios::ScenarioOutcome,
    scripted_model::{code_answer, ScriptedModel},
};

pub const TASK: &str = "What is the capital of Japan, and roughly how many people live there?";

// ── UDF implementation ───────────────────────────────────────────────────────

/// Looks a country up in the mock gazetteer.
pub struct LookupCapitalUdf {
    input: Schema,
    output: Schema,
}

impl LookupCapitalUdf {
    pub fn new() -> Self {
        Self {
            input: Schema::object(vec![Property::required(
                "country",
                Schema::string().describe("Country name in English"),
            )]),
            output: Schema::object(vec![
                Property::required("capital", Schema::string()),
                Property::required("populationMillions", Schema::number()),
            ]),
        }
    }
}

impl Default for LookupCapitalUdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Udf for LookupCapitalUdf {
    fn name(&self) -> &str {
        "lookupCapital"
    }

    fn description(&self) -> &str {
        "Look up the capital city of a country and its population in millions"
    }

    fn input_schema(&self) -> &Schema {
        &self.input
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.output)
    }

    async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
        let country = input["country"].as_str().unwrap_or_default();
        let (capital, population) =
            capital_of(country).ok_or_else(|| UdfError::new(format!("no record for {country}")))?;
        Ok(json!({ "capital": capital, "populationMillions": population }))
    }
}

// ── Model scripts ────────────────────────────────────────────────────────────

fn researcher_completions() -> Vec<String> {
    vec![code_answer(
        "Look the country up and report both facts.",
        "const facts = await lookupCapital({country: 'Japan'})\nawait finalAnswer({answer: `${facts.capital} (${facts.populationMillions} million people)`})",
    )]
}

fn manager_completions() -> Vec<String> {
    vec![
        code_answer(
            "The researcher has the gazetteer, I will ask it.",
            "const report = await callResearcher({task: 'Find the capital of Japan and its population'})\nconsole.log(report)",
        ),
        code_answer(
            "The report answers the question.",
            "await finalAnswer({answer: 'The capital of Japan is Tokyo, home to about 14 million people.'})",
        ),
    ]
}

/// The manager's outcome plus the researcher's memory.
pub struct DelegationReport {
    pub outcome: ScenarioOutcome,
    pub researcher_memory: AgentMemory,
    pub researcher_model_calls: usize,
}

/// Run Task 3: Delegation.
pub async fn run_scenario() -> Result<DelegationReport, RunError> {
    println!("=== Task 3: Delegation ===");
    println!();

    let researcher_model = Arc::new(ScriptedModel::new(researcher_completions()));
    let researcher = CodeAgent::builder("researcher", researcher_model.clone())
        .description("Answers geography questions using the gazetteer.")
        .udf(Arc::new(LookupCapitalUdf::new()))
        .udf(Arc::new(FinalAnswerUdf::new()))
        .build()?;
    let researcher = Arc::new(ManagedCodeAgent::new(researcher));

    let manager_model = Arc::new(ScriptedModel::new(manager_completions()));
    let mut manager = CodeAgent::builder("manager", manager_model.clone())
        .description("Coordinates specialists to answer questions.")
        .udf(Arc::new(FinalAnswerUdf::new()))
        .managed_agent(researcher.clone())
        .build()?;

    println!("  Task: {TASK}");
    let udf_names: Vec<&str> = manager.context().udfs().iter().map(|udf| udf.name()).collect();
    println!("  Manager UDFs: {}", udf_names.join(", "));

    let answer = manager.run(TASK, Vec::new()).await?;
    let researcher_memory = researcher.memory().await;

    println!(
        "  Researcher: {} step(s), answer {}",
        researcher_memory.action_steps().count(),
        researcher_memory
            .last_action_step()
            .and_then(|step| step.action_output.clone())
            .map_or("none".to_string(), |v| v.to_string())
    );
    println!("  Manager answer: {}", answer.as_ref().map_or("none".to_string(), |a| a.to_string()));
    println!();
    println!("  Task 3 complete.");
    println!();

    Ok(DelegationReport {
        outcome: ScenarioOutcome {
            answer,
            memory: manager.memory(),
            model_calls: manager_model.requests().len(),
        },
        researcher_memory,
        researcher_model_calls: researcher_model.requests().len(),
    })
}

#[cfg(test)]
mod tests {
    use stepwise_memory::MemoryStep;

    use super::*;

    #[tokio::test]
    async fn manager_answers_through_the_researcher() {
        let report = run_scenario().await.unwrap();

        assert_eq!(
            report.outcome.answer,
            Some(json!({"answer": "The capital of Japan is Tokyo, home to about 14 million people."}))
        );
        assert_eq!(report.outcome.model_calls, 2);
        assert_eq!(report.researcher_model_calls, 1);
    }

    #[tokio::test]
    async fn researcher_answer_reaches_the_manager_as_a_report() {
        let report = run_scenario().await.unwrap();

        let first = report.outcome.memory.action_steps().next().unwrap();
        let observation = format!("{:?}", first.observations);
        assert!(observation.contains("Here is the final answer from your managed agent 'researcher':"));
        assert!(observation.contains("Tokyo (14 million people)"));

        let MemoryStep::Task(task) = &report.researcher_memory.steps[0] else {
            panic!("expected the researcher's task first");
        };
        assert!(task.task.contains("Find the capital of Japan and its population"));
    }

    #[tokio::test]
    async fn unknown_countries_fail_the_call() {
        let agent = CodeAgent::builder("researcher", Arc::new(ScriptedModel::new(Vec::<String>::new())))
            .udf(Arc::new(LookupCapitalUdf::new()))
            .udf(Arc::new(FinalAnswerUdf::new()))
            .build()
            .unwrap();

        let err = agent
            .call_udf("lookupCapital", json!({"country": "Atlantis"}))
            .await
            .unwrap_err();

        assert_eq!(err.code, stepwise_contracts::error::ErrorCode::UdfExecutionError);
        assert!(err.message.contains("Error: no record for Atlantis"));
    }
}
