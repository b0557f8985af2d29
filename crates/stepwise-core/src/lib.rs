//! # stepwise-core
//!
//! The code-agent loop of the stepwise runtime.
//!
//! A [`CodeAgent`] asks a [`ChatModel`] for a short script, runs it in a
//! stateful sandbox where every registered [`Udf`] is an async function, and
//! feeds the console output back as the next observation. The run ends when
//! a stopping UDF (such as [`udf::FinalAnswerUdf`]) is called, when the step
//! budget is spent, or when the same error repeats three steps in a row.
//!
//! Agents compose: wrap one in a [`ManagedCodeAgent`] and hand it to another
//! agent's builder, and the manager gains a `call<Name>` UDF that delegates
//! to it.
//!
//! ```rust,ignore
//! use stepwise_core::{udf::FinalAnswerUdf, CodeAgent};
//!
//! let mut agent = CodeAgent::builder("solver", model)
//!     .udf(Arc::new(FinalAnswerUdf::new()))
//!     .build()?;
//! let answer = agent.run("What is 2 + 2?", Vec::new()).await?;
//! ```

pub mod agent;
pub mod context;
pub mod logger;
pub mod managed;
pub mod traits;
pub mod udf;

#[cfg(test)]
mod testing;

pub use agent::{parse_code_output, CodeAgent, CodeAgentBuilder};
pub use context::AgentContext;
pub use logger::TracingLogger;
pub use managed::ManagedCodeAgent;
pub use traits::{ChatModel, ManagedAgent, StepHooks, StoppingUdf, Udf};
