//! # Troupe
//!
//! A multi-agent orchestration runtime: a cast of conversational LLM agents
//! is driven through a collection of tasks by an [`Orchestrator`] under one
//! of three execution processes, with a pluggable [`memory`] layer
//! persisting conversational and semantic state across runs.
//!
//! ## Design principles
//!
//! - **Relations by id, not pointers**: tasks reference agents and other
//!   tasks by name/index through the orchestrator's registries, so there are
//!   no back-pointer cycles to manage.
//! - **Pure prompts**: what a task sends to the model is built by a pure
//!   function over the stored description, prior outputs, and memory —
//!   stored state is never mutated to build a prompt.
//! - **Injected providers**: LLMs, embedders, tools, and knowledge backends
//!   are constructor arguments behind traits; environment variables are
//!   explicit fallbacks in [`config`], never import-time globals.
//!
//! ## Subsystems
//!
//! - [`agent`]: [`Agent`] — the conversational loop with tool-call
//!   resolution and optional self-reflection; history discipline is exactly
//!   one user and one assistant record per successful chat.
//! - [`orchestrator`]: [`Orchestrator`] — agent/task registries, retry loop,
//!   context assembly, process selection, shared memory, run report.
//! - [`process`]: [`SequentialProcess`], [`WorkflowProcess`] (decisions,
//!   loops, CSV fan-out), [`HierarchicalProcess`] (manager dispatch).
//! - [`memory`]: [`Memory`] facade over [`MemoryStore`] backends
//!   ([`SqliteMemoryStore`], [`InMemoryMemoryStore`], [`VectorMemoryStore`],
//!   [`CachedMemoryStore`]) with quality-scored promotion.
//! - [`llm`]: [`LlmClient`] trait with [`MockLlm`] (scripted, for tests) and
//!   [`OpenAiChat`] (OpenAI-compatible endpoint).
//! - [`tools`]: [`Tool`] trait, [`Parameters`] schema builder, [`FnTool`],
//!   [`ToolRegistry`].
//! - [`knowledge`]: the external `search(query, scope) → snippets` contract.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use troupe::{Agent, MockLlm, Orchestrator, Task};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let llm = Arc::new(MockLlm::reply("2, 3, 5"));
//!
//! let mut orchestrator = Orchestrator::new();
//! orchestrator.register_agent(
//!     Agent::new("Researcher", "openai/gpt-4o-mini", llm.clone())
//!         .with_role("Researcher")
//!         .with_goal("Find prime numbers"),
//! );
//! orchestrator.register_task(
//!     Task::new("Find 3 prime numbers", "A comma-separated list")
//!         .with_agent("Researcher"),
//! );
//!
//! let report = orchestrator.start(None).await.unwrap();
//! assert_eq!(report.results[&0].raw, "2, 3, 5");
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod process;
pub mod task;
pub mod tools;

pub use agent::{Agent, ChatOptions};
pub use error::RuntimeError;
pub use knowledge::{Knowledge, KnowledgeHit, KnowledgeScope, StaticKnowledge};
pub use llm::{
    ChatRequest, LlmClient, LlmResponse, LlmToolCall, LlmUsage, MessageChunk, MockLlm, OpenAiChat,
};
pub use memory::{
    CachedMemoryStore, Embedder, HashEmbedder, InMemoryMemoryStore, Memory, MemoryConfig,
    MemoryError, MemoryHit, MemoryRecord, MemoryScope, MemoryStore, OpenAiEmbedder, Quality,
    QualityMetrics, SqliteMemoryStore, VectorMemoryStore,
};
pub use message::{ContentPart, ImageUrl, Message, MessageContent, Prompt, Role};
pub use orchestrator::{CompletionChecker, Orchestrator, RunReport};
pub use process::{
    HierarchicalProcess, Process, ProcessKind, SequentialProcess, WorkflowProcess,
};
pub use task::{
    clean_json_fences, ContextItem, OutputFormat, OutputSchema, Task, TaskCallback, TaskOutput,
    TaskRegistry, TaskStatus, TaskType,
};
pub use tools::{FnTool, ParamType, Parameters, Tool, ToolError, ToolRegistry, ToolSpec};
