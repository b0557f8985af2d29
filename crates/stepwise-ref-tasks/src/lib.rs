//! # stepwise-ref-tasks
//!
//! Reference tasks for the stepwise code agent.
//!
//! Each task wires a real `CodeAgent` (sandbox, UDFs, planning, memory) to a
//! [`ScriptedModel`] that replays canned completions, so every run is
//! deterministic and needs no network access:
//!
//! 1. **Simple math**: one computation step, then `finalAnswer`.
//! 2. **Data collection**: a custom search UDF feeding the datasheet and
//!    notebook UDFs across steps, with one failed call and a retry.
//! 3. **Delegation**: a manager agent calling a managed researcher agent.
//! 4. **Replanning**: settings loaded from TOML, an initial plan, a
//!    `think`-forced replan and interval replanning.
//!
//! All data is hardcoded and fictional.

pub mod mock_data;
pub mod scenarios;
pub mod scripted_model;

pub use scripted_model::ScriptedModel;
