//! Runtime error types.
//!
//! One enum covers the run-facing failure categories; subsystem-local errors
//! (`ToolError`, `MemoryError`) convert into it at the seams. Tool failures
//! are normally recovered inside the agent loop and never surface here; the
//! variant exists for callers that invoke tools directly.

use thiserror::Error;

/// Error surfaced by agents, processes, and the orchestrator.
///
/// Propagation policy: `Llm` reaches the task retry loop; `Tool` is fed back
/// to the model as a tool result; `Schema` costs one reflection attempt or
/// degrades a task output to raw text; `Config` fails fast at construction
/// or run entry; `Resource` fails the task and the run continues;
/// `Cancelled` aborts the run without retry.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Transport or model failure at the LLM provider.
    #[error("llm: {0}")]
    Llm(String),

    /// A tool raised or returned an error payload.
    #[error("tool: {0}")]
    Tool(String),

    /// Structured-output parse or validation failure.
    #[error("schema: {0}")]
    Schema(String),

    /// Missing API key, unknown provider, conflicting output schemas,
    /// invalid workflow reference.
    #[error("config: {0}")]
    Config(String),

    /// Missing optional capability (e.g. video decoding) or an inaccessible
    /// input file.
    #[error("resource: {0}")]
    Resource(String),

    /// Caller-requested cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl From<crate::tools::ToolError> for RuntimeError {
    fn from(e: crate::tools::ToolError) -> Self {
        RuntimeError::Tool(e.to_string())
    }
}
