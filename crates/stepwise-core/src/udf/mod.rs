//! Built-in UDFs.
//!
//! `FinalAnswerUdf` and `TerminateUdf` are stopping UDFs; every `CodeAgent`
//! needs at least one. `CallAgentUdf` is generated for each managed agent.

mod call_agent;
mod datasheet_write;
mod final_answer;
mod notebook_write;
mod terminate;
mod think;

pub use call_agent::CallAgentUdf;
pub use datasheet_write::DatasheetWriteUdf;
pub use final_answer::FinalAnswerUdf;
pub use notebook_write::NotebookWriteUdf;
pub use terminate::TerminateUdf;
pub use think::ThinkUdf;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::{context::AgentContext, traits::Udf};

    /// A context holding only `udfs`, for exercising UDFs in isolation.
    pub(crate) fn context(udfs: Vec<Arc<dyn Udf>>) -> AgentContext {
        AgentContext::new("tester", udfs, Vec::new(), None)
    }
}
