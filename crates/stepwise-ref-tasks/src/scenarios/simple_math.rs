//! Task 1: Simple math
//!
//! The smallest complete run: one step computes a value and leaves it in a
//! global, the next step reads that global and calls `finalAnswer`.
//!
//! Walk-through:
//!   1. Step 1 script computes the area of a circle and logs it
//!   2. The console output becomes the step's observation
//!   3. Step 2 script reuses `area` from the persistent sandbox frame
//!   4. `finalAnswer` is a stopping UDF, so the run ends with its input

use std::sync::Arc;

use stepwise_contracts::error::RunError;
use stepwise_core::{udf::FinalAnswerUdf, CodeAgent};

use crate::{
    scenarios::ScenarioOutcome,
    scripted_model::{code_answer, ScriptedModel},
};

pub const TASK: &str = "What is the area of a circle with radius 3, to two decimals?";

fn completions() -> Vec<String> {
    vec![
        code_answer(
            "I will compute the area first and look at it.",
            "const radius = 3\nconst area = Math.PI * radius * radius\nconsole.log(area.toFixed(2))",
        ),
        code_answer(
            "The area is known, I can answer.",
            "await finalAnswer({answer: `The area is ${area.toFixed(2)}`})",
        ),
    ]
}

/// Run Task 1: Simple math.
pub async fn run_scenario() -> Result<ScenarioOutcome, RunError> {
    println!("=== Task 1: Simple math ===");
    println!();

    let model = Arc::new(ScriptedModel::new(completions()));
    let mut agent = CodeAgent::builder("calculator", model.clone())
        .description("Answers arithmetic questions.")
        .udf(Arc::new(FinalAnswerUdf::new()))
        .build()?;

    println!("  Task: {TASK}");
    let answer = agent.run(TASK, Vec::new()).await?;
    let memory = agent.memory();

    for step in memory.action_steps() {
        println!(
            "  Step {}: {}",
            step.step_number,
            match &step.error {
                Some(err) => format!("error ({})", err.code),
                None => "ok".to_string(),
            }
        );
    }
    println!("  Answer: {}", answer.as_ref().map_or("none".to_string(), |a| a.to_string()));
    println!();
    println!("  Task 1 complete.");
    println!();

    Ok(ScenarioOutcome {
        answer,
        memory,
        model_calls: model.requests().len(),
    })
}
