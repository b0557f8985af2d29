//! Task 2: Data collection
//!
//! Demonstrates a custom UDF working alongside the built-in datasheet and
//! notebook UDFs, and the loop's recovery from a failed call.
//!
//! Walk-through:
//!   1. `searchBooks` finds the 2024 science fiction titles; its call result
//!      is summarized rather than dumped
//!   2. A call with the wrong input shape fails validation; the error is
//!      recorded on the step and fed back with a retry instruction
//!   3. The corrected call finds the 2024 adventure titles
//!   4. Both lists (plus a duplicate) go to `datasheetWrite`, which keeps
//!      three unique rows; a note is written and the run ends

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use stepwise_contracts::error::{RunError, UdfError};
use stepwise_core::{
    udf::{DatasheetWriteUdf, FinalAnswerUdf, NotebookWriteUdf},
    AgentContext, CodeAgent, Udf,
};
use stepwise_schema::{Property, Schema};

use crate::{
    mock_data::search_books,
    scenarios::ScenarioOutcome,
    scripted_model::{code_answer, ScriptedModel},
};

pub const TASK: &str = "Collect the title and author of every 2024 science fiction and adventure book.";

// ── UDF implementation ───────────────────────────────────────────────────────

/// Searches the mock book catalogue.
pub struct SearchBooksUdf {
    input: Schema,
    output: Schema,
}

impl SearchBooksUdf {
    pub fn new() -> Self {
        Self {
            input: Schema::object(vec![
                Property::required("query", Schema::string().describe("Genre or title words")),
                Property::optional("year", Schema::integer().describe("Publication year")),
            ]),
            output: Schema::array(Schema::object(vec![
                Property::required("title", Schema::string()),
                Property::required("author", Schema::string()),
                Property::required("year", Schema::integer()),
                Property::required("genre", Schema::string()),
            ])),
        }
    }
}

impl Default for SearchBooksUdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Udf for SearchBooksUdf {
    fn name(&self) -> &str {
        "searchBooks"
    }

    fn description(&self) -> &str {
        "Search the book catalogue by genre or title"
    }

    fn input_schema(&self) -> &Schema {
        &self.input
    }

    fn output_schema(&self) -> Option<&Schema> {
        Some(&self.output)
    }

    async fn call(&self, input: Value, _ctx: &AgentContext) -> Result<Value, UdfError> {
        let query = input["query"].as_str().unwrap_or_default();
        let year = input["year"].as_u64().and_then(|y| u32::try_from(y).ok());
        Ok(Value::Array(search_books(query, year)))
    }

    async fn call_result_summary(&self, output: &Value) -> Option<String> {
        let books = output.as_array()?;
        let titles: Vec<&str> = books.iter().filter_map(|b| b["title"].as_str()).collect();
        Some(format!("{} books found: {}", books.len(), titles.join(", ")))
    }
}

// ── Model script ─────────────────────────────────────────────────────────────

fn completions() -> Vec<String> {
    vec![
        code_answer(
            "Search science fiction first.",
            "const books = await searchBooks({query: 'science fiction', year: 2024})\nconsole.log(books.length)",
        ),
        code_answer(
            "Now the adventure books.",
            "const adventure = await searchBooks({genre: 'adventure', year: 2024})",
        ),
        code_answer(
            "The UDF takes a query, not a genre.",
            "const adventure = await searchBooks({query: 'adventure', year: 2024})\nconsole.log(adventure.length)",
        ),
        code_answer(
            "Store the rows, note the count, and answer.",
            [
                "const rows = [...books, ...adventure, books[0]].map(b => {",
                "  return {title: b.title, author: b.author}",
                "})",
                "const saved = await datasheetWrite(rows)",
                "await notebookWrite(`Collected ${saved.totalSuccessCount} books`)",
                "await finalAnswer({answer: `${saved.totalSuccessCount} books collected`})",
            ]
            .join("\n")
            .as_str(),
        ),
    ]
}

/// Everything the data-collection run leaves behind.
pub struct CollectionReport {
    pub outcome: ScenarioOutcome,
    pub rows: Vec<Value>,
    pub notebook: String,
}

/// Run Task 2: Data collection.
pub async fn run_scenario() -> Result<CollectionReport, RunError> {
    println!("=== Task 2: Data collection ===");
    println!();

    let model = Arc::new(ScriptedModel::new(completions()));
    let datasheet = Arc::new(DatasheetWriteUdf::new(json!({"title": "", "author": ""})));
    let notebook = Arc::new(NotebookWriteUdf::new());

    let mut agent = CodeAgent::builder("collector", model.clone())
        .description("Collects structured data from the catalogue.")
        .udf(Arc::new(SearchBooksUdf::new()))
        .udf(datasheet.clone())
        .udf(notebook.clone())
        .udf(Arc::new(FinalAnswerUdf::new()))
        .build()?;

    println!("  Task: {TASK}");
    let answer = agent.run(TASK, Vec::new()).await?;
    let memory = agent.memory();

    for step in memory.action_steps() {
        match &step.error {
            Some(err) => println!("  Step {}: {} (retried)", step.step_number, err.code),
            None => println!("  Step {}: ok", step.step_number),
        }
    }
    let rows = datasheet.entries();
    println!("  Datasheet rows: {}", rows.len());
    for row in &rows {
        println!("    - {} by {}", row["title"].as_str().unwrap_or("?"), row["author"].as_str().unwrap_or("?"));
    }
    println!("  Notebook: {}", notebook.content());
    println!();
    println!("  Task 2 complete.");
    println!();

    Ok(CollectionReport {
        outcome: ScenarioOutcome {
            answer,
            memory,
            model_calls: model.requests().len(),
        },
        rows,
        notebook: notebook.content(),
    })
}

#[cfg(test)]
mod tests {
    use stepwise_contracts::error::ErrorCode;

    use super::*;

    #[tokio::test]
    async fn collects_unique_rows_after_one_retry() {
        let report = run_scenario().await.unwrap();

        assert_eq!(report.outcome.answer, Some(json!({"answer": "3 books collected"})));
        assert_eq!(report.notebook, "Collected 3 books");
        let titles: Vec<&str> = report.rows.iter().filter_map(|r| r["title"].as_str()).collect();
        assert_eq!(
            titles,
            vec!["Salt and Circuitry", "The Quiet Compiler", "A Map of Lost Rivers"]
        );

        let errors: Vec<Option<ErrorCode>> = report
            .outcome
            .memory
            .action_steps()
            .map(|s| s.error.as_ref().map(|e| e.code))
            .collect();
        assert_eq!(
            errors,
            vec![None, Some(ErrorCode::ScriptExecutionFailed), None, None]
        );
    }

    #[tokio::test]
    async fn search_results_are_summarized_for_the_model() {
        let report = run_scenario().await.unwrap();
        let first = report.outcome.memory.action_steps().next().unwrap();
        let observation = format!("{:?}", first.observations);
        assert!(observation.contains("2 books found: Salt and Circuitry, The Quiet Compiler"));
    }
}
