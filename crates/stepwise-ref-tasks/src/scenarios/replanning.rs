//! Task 4: Replanning
//!
//! Shows both ways a plan gets revised: on the configured interval, and on
//! demand through the `think` UDF. Settings come from
//! `settings/replanning.toml`.
//!
//! Walk-through:
//!   1. `plan_first` opens the run with a facts survey and an initial plan
//!   2. Step 1 sums the numbers; step 1 is on the interval, so a revised
//!      plan follows
//!   3. Step 2 calls `think`, which forces another revision
//!   4. Step 3 computes the mean, notes it, and answers

use std::sync::Arc;

use stepwise_config::AgentSettings;
use stepwise_contracts::error::RunError;
use stepwise_core::{
    udf::{FinalAnswerUdf, NotebookWriteUdf, ThinkUdf},
    CodeAgent,
};

use crate::{
    scenarios::ScenarioOutcome,
    scripted_model::{code_answer, ScriptedModel},
};

pub const TASK: &str = "What is the mean of 4, 8 and 15? Keep a note of it.";

const SETTINGS: &str = include_str!("../../settings/replanning.toml");

fn completions() -> Vec<String> {
    vec![
        // initial planning
        "### 1. Facts given in the task\n- The numbers are 4, 8 and 15\n### 2. Facts to look up\nNone\n### 3. Facts to derive\n- Their sum and mean".to_string(),
        "1. Sum the numbers\n2. Divide by the count\n3. Note and report the mean".to_string(),
        code_answer(
            "Start with the sum.",
            "const numbers = [4, 8, 15]\nconst sum = numbers.reduce((a, b) => a + b, 0)\nconsole.log(sum)",
        ),
        // interval replanning
        "### 1. Facts given in the task\n- The numbers are 4, 8 and 15\n### 2. Facts that we have learned\n- The sum is 27\n### 3. Facts still to look up\nNone\n### 4. Facts still to derive\n- The mean".to_string(),
        "1. Double-check the approach\n2. Divide 27 by 3\n3. Note and report the mean".to_string(),
        code_answer("Pause and reconsider before dividing.", "await think()"),
        // forced replanning
        "### 1. Facts given in the task\n- The numbers are 4, 8 and 15\n### 2. Facts that we have learned\n- The sum is 27\n### 3. Facts still to look up\nNone\n### 4. Facts still to derive\n- The mean".to_string(),
        "1. Divide 27 by 3\n2. Note and report the mean".to_string(),
        code_answer(
            "Divide, note, answer.",
            "const mean = sum / numbers.length\nawait notebookWrite(`mean=${mean}`)\nawait finalAnswer({answer: `${mean}`})",
        ),
    ]
}

/// The run's outcome plus the note it left.
pub struct ReplanningReport {
    pub outcome: ScenarioOutcome,
    pub notebook: String,
}

/// Run Task 4: Replanning.
pub async fn run_scenario() -> Result<ReplanningReport, RunError> {
    println!("=== Task 4: Replanning ===");
    println!();

    let settings = AgentSettings::from_toml_str(SETTINGS)?;
    println!(
        "  Settings: max_steps={}, planning_interval={:?}, plan_first={}",
        settings.max_steps, settings.planning_interval, settings.plan_first
    );

    let model = Arc::new(ScriptedModel::new(completions()));
    let notebook = Arc::new(NotebookWriteUdf::new());
    let mut agent = CodeAgent::builder("statistician", model.clone())
        .description("Computes summary statistics.")
        .settings(settings)
        .udf(Arc::new(ThinkUdf::new()))
        .udf(notebook.clone())
        .udf(Arc::new(FinalAnswerUdf::new()))
        .build()?;

    println!("  Task: {TASK}");
    let answer = agent.run(TASK, Vec::new()).await?;
    let memory = agent.memory();

    for (i, planning) in memory.planning_steps().enumerate() {
        let label = if i == 0 { "Initial plan" } else { "Updated plan" };
        println!("  {label}:");
        for line in planning.model_output_message_plan.content.lines() {
            println!("    {line}");
        }
    }
    println!("  Action steps: {}", memory.action_steps().count());
    println!("  Notebook: {}", notebook.content());
    println!("  Answer: {}", answer.as_ref().map_or("none".to_string(), |a| a.to_string()));
    println!();
    println!("  Task 4 complete.");
    println!();

    Ok(ReplanningReport {
        outcome: ScenarioOutcome {
            answer,
            memory,
            model_calls: model.requests().len(),
        },
        notebook: notebook.content(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stepwise_memory::MemoryStep;

    use super::*;

    #[test]
    fn bundled_settings_parse() {
        let settings = AgentSettings::from_toml_str(SETTINGS).unwrap();
        assert_eq!(settings.max_steps, 6);
        assert_eq!(settings.planning_interval, Some(2));
        assert!(settings.plan_first);
    }

    #[tokio::test]
    async fn plans_on_the_interval_and_on_demand() {
        let report = run_scenario().await.unwrap();

        assert_eq!(report.outcome.answer, Some(json!({"answer": "9"})));
        assert_eq!(report.notebook, "mean=9");
        assert_eq!(report.outcome.model_calls, 9);

        let kinds: Vec<&str> = report
            .outcome
            .memory
            .steps
            .iter()
            .map(|step| match step {
                MemoryStep::Task(_) => "task",
                MemoryStep::Planning(_) => "planning",
                MemoryStep::Action(_) => "action",
                MemoryStep::SystemPrompt(_) => "system",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["task", "planning", "action", "planning", "action", "planning", "action"]
        );
    }

    #[tokio::test]
    async fn revised_plans_replace_the_old_ones() {
        let report = run_scenario().await.unwrap();
        let plans: Vec<&str> = report
            .outcome
            .memory
            .planning_steps()
            .map(|p| p.plan.as_str())
            .collect();
        assert_eq!(plans.len(), 3);
        assert!(plans[0].contains("1. Sum the numbers"));
        assert!(plans[2].contains("1. Divide 27 by 3"));
    }
}
