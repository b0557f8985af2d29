//! stepwise Code Agent: Demo CLI
//!
//! Runs one or all of the four reference tasks. Each task drives a real
//! `CodeAgent` (sandbox, UDFs, planning, memory) with a scripted model, so
//! runs are deterministic and offline.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- simple-math
//!   cargo run -p demo -- --replay data-collection
//!   cargo run -p demo -- --replay --detailed replanning

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use stepwise_contracts::{
    error::RunError,
    logger::{AgentLogger, LogLevel},
    message::ChatMessage,
};
use stepwise_ref_tasks::scenarios::{
    data_collection, delegation, replanning, simple_math, ScenarioOutcome,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// stepwise: a code agent that thinks in small scripts.
///
/// Each subcommand runs one or all of the reference tasks against a scripted
/// model and prints what the agent did.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "stepwise code agent reference tasks",
    long_about = "Runs stepwise reference tasks showing the script sandbox, UDF calls,\n\
                  error recovery, sub-agent delegation, and replanning."
)]
struct Cli {
    /// Replay each task's memory after it finishes.
    #[arg(long, global = true)]
    replay: bool,

    /// With --replay, include system prompts and model inputs.
    #[arg(long, global = true, requires = "replay")]
    detailed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four reference tasks in sequence.
    RunAll,
    /// Task 1: Simple math (one computation step, then finalAnswer).
    SimpleMath,
    /// Task 2: Data collection (custom UDF, datasheet, notebook, one retry).
    DataCollection,
    /// Task 3: Delegation (manager calling a managed researcher agent).
    Delegation,
    /// Task 4: Replanning (TOML settings, interval and think-forced plans).
    Replanning,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=stepwise=info to watch the agent loop.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let replay = cli.replay.then_some(cli.detailed);

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(replay).await,
        Command::SimpleMath => run_simple_math(replay).await,
        Command::DataCollection => run_data_collection(replay).await,
        Command::Delegation => run_delegation(replay).await,
        Command::Replanning => run_replanning(replay).await,
    };

    match result {
        Ok(()) => {
            println!("All selected tasks completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Task dispatch ─────────────────────────────────────────────────────────────

/// `replay` is `Some(detailed)` when the memory should be replayed.
type Replay = Option<bool>;

async fn run_all(replay: Replay) -> Result<(), RunError> {
    run_simple_math(replay).await?;
    run_data_collection(replay).await?;
    run_delegation(replay).await?;
    run_replanning(replay).await?;
    Ok(())
}

async fn run_simple_math(replay: Replay) -> Result<(), RunError> {
    let outcome = simple_math::run_scenario().await?;
    finish(&outcome, replay);
    Ok(())
}

async fn run_data_collection(replay: Replay) -> Result<(), RunError> {
    let report = data_collection::run_scenario().await?;
    finish(&report.outcome, replay);
    Ok(())
}

async fn run_delegation(replay: Replay) -> Result<(), RunError> {
    let report = delegation::run_scenario().await?;
    finish(&report.outcome, replay);
    if let Some(detailed) = replay {
        println!("--- Researcher memory ---");
        report.researcher_memory.replay(&ConsoleLogger, detailed);
        println!();
    }
    Ok(())
}

async fn run_replanning(replay: Replay) -> Result<(), RunError> {
    let report = replanning::run_scenario().await?;
    finish(&report.outcome, replay);
    Ok(())
}

fn finish(outcome: &ScenarioOutcome, replay: Replay) {
    debug!(model_calls = outcome.model_calls, "task finished");
    if let Some(detailed) = replay {
        outcome.memory.replay(&ConsoleLogger, detailed);
        println!();
    }
}

// ── Console logger ────────────────────────────────────────────────────────────

/// Prints replayed memory straight to stdout.
struct ConsoleLogger;

impl AgentLogger for ConsoleLogger {
    fn log_task(&self, content: &str) {
        println!("New task:");
        for line in content.lines() {
            println!("  {line}");
        }
    }

    fn log_rule(&self, title: &str, _level: LogLevel) {
        println!("━━━━━━━━━━ {title} ━━━━━━━━━━");
    }

    fn log(&self, level: LogLevel, content: &str) {
        match level {
            LogLevel::Warning | LogLevel::Error => println!("[{level:?}] {content}"),
            LogLevel::Debug | LogLevel::Info => println!("{content}"),
        }
    }

    fn log_markdown(&self, title: Option<&str>, content: &str) {
        if let Some(title) = title {
            println!("{title}");
        }
        for line in content.lines() {
            println!("  {line}");
        }
    }

    fn log_messages(&self, messages: Option<&[ChatMessage]>) {
        for message in messages.unwrap_or_default() {
            println!("  [{:?}] {}", message.role, message.content);
        }
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("stepwise: Code Agent Runtime");
    println!("Reference Task Demo");
    println!("============================");
    println!();
    println!("Per action step:");
    println!("  [1] The model sees the memory so far and writes a short script");
    println!("  [2] The script runs in a sandbox whose globals persist across steps");
    println!("  [3] Every UDF call is validated against its input schema");
    println!("  [4] Console output and call results become the next observation");
    println!("  [5] A stopping UDF ends the run; repeated errors trip the breaker");
    println!();
}
