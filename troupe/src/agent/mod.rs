//! Agent runtime: a single conversational agent with tool-call resolution
//! and optional self-reflection.
//!
//! An agent owns its identity (role/goal/backstory), an LLM binding, a tool
//! registry, an optional knowledge handle, and its `chat_history`. It does
//! not own long-term memory; that belongs to the orchestrator. The history
//! is a plain mutable field so bot-style callers can implement the per-user
//! swap pattern (or use [`Agent::fork`] for a config-sharing clone).
//!
//! At most one in-flight `chat` per instance is expected; the orchestrator
//! wraps registered agents in an async mutex.

mod chat;
mod reflection;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::knowledge::Knowledge;
use crate::llm::{LlmClient, MessageChunk};
use crate::message::Message;
use crate::task::{OutputSchema, Task};
use crate::tools::{Tool, ToolRegistry};

/// Per-call options for [`Agent::chat`].
#[derive(Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature; `None` means the default 0.2.
    pub temperature: Option<f32>,
    /// Tool-name override; `None` uses the agent's full registry, an empty
    /// list disables tools for the call.
    pub tools: Option<Vec<String>>,
    /// Declared output shape; json/typed suppress self-reflection.
    pub output: OutputSchema,
    /// Emit the final response through `chunk_tx` as it is produced.
    pub stream: bool,
    pub chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    /// Caller-supplied cancellation; checked at every suspension point.
    pub cancel: Option<CancellationToken>,
}

impl ChatOptions {
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.2)
    }
}

/// A conversational LLM agent.
pub struct Agent {
    /// Stable identity for logs and knowledge scoping.
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Freeform instructions; used when auto-generating a task.
    pub instructions: Option<String>,
    pub(crate) llm: Arc<dyn LlmClient>,
    /// Model identifier, provider-prefixed accepted.
    pub model: String,
    pub(crate) reflect_llm: Option<Arc<dyn LlmClient>>,
    pub reflect_model: Option<String>,
    pub(crate) tools: ToolRegistry,
    pub(crate) knowledge: Option<Arc<dyn Knowledge>>,
    pub self_reflect: bool,
    /// Minimum reflection rounds before "satisfactory" is accepted; ≥ 1.
    pub min_reflect: u32,
    /// Maximum reflection rounds; ≥ 1.
    pub max_reflect: u32,
    pub use_system_prompt: bool,
    pub verbose: bool,
    pub markdown: bool,
    /// Propagated into knowledge queries and memory metadata.
    pub user_id: Option<String>,
    /// Conversation history. Mutated only by the agent itself, or via the
    /// caller-side session-swap contract.
    pub chat_history: Vec<Message>,
}

impl Agent {
    pub fn new(name: impl Into<String>, model: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            role: name.clone(),
            name,
            goal: String::new(),
            backstory: String::new(),
            instructions: None,
            llm,
            model: model.into(),
            reflect_llm: None,
            reflect_model: None,
            tools: ToolRegistry::new(),
            knowledge: None,
            self_reflect: false,
            min_reflect: 1,
            max_reflect: 3,
            use_system_prompt: true,
            verbose: false,
            markdown: true,
            user_id: None,
            chat_history: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn Knowledge>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Enables self-reflection. Both bounds are clamped to ≥ 1.
    pub fn with_self_reflection(mut self, min_reflect: u32, max_reflect: u32) -> Self {
        self.self_reflect = true;
        self.min_reflect = min_reflect.max(1);
        self.max_reflect = max_reflect.max(1);
        self
    }

    /// Separate model for the reflection pass; falls back to the main LLM.
    pub fn with_reflect_llm(mut self, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        self.reflect_llm = Some(llm);
        self.reflect_model = Some(model.into());
        self
    }

    pub fn without_system_prompt(mut self) -> Self {
        self.use_system_prompt = false;
        self
    }

    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Cheap clone sharing configuration but not history.
    ///
    /// Forks keep the agent id (they are the same logical agent); their
    /// `chat_history` starts empty.
    pub fn fork(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            role: self.role.clone(),
            goal: self.goal.clone(),
            backstory: self.backstory.clone(),
            instructions: self.instructions.clone(),
            llm: Arc::clone(&self.llm),
            model: self.model.clone(),
            reflect_llm: self.reflect_llm.clone(),
            reflect_model: self.reflect_model.clone(),
            tools: self.tools.clone(),
            knowledge: self.knowledge.clone(),
            self_reflect: self.self_reflect,
            min_reflect: self.min_reflect,
            max_reflect: self.max_reflect,
            use_system_prompt: self.use_system_prompt,
            verbose: self.verbose,
            markdown: self.markdown,
            user_id: self.user_id.clone(),
            chat_history: Vec::new(),
        }
    }

    /// Installs a session history and returns the previous one.
    ///
    /// The swap half of the per-user session pattern: swap in the user's
    /// history, run `chat`, swap back and persist what this returns.
    pub fn swap_history(&mut self, history: Vec<Message>) -> Vec<Message> {
        std::mem::replace(&mut self.chat_history, history)
    }

    /// System prompt from backstory/role/goal, plus the JSON instruction
    /// when an output schema is declared. `None` when disabled.
    pub(crate) fn system_prompt(&self, output: &OutputSchema) -> Option<String> {
        if !self.use_system_prompt {
            return None;
        }
        let mut prompt = format!(
            "{}\nYour Role: {}\nYour Goal: {}",
            self.backstory, self.role, self.goal
        );
        if let Some(schema) = output.schema() {
            prompt.push_str(&format!(
                "\nReturn ONLY a JSON object that matches this schema: {}",
                schema
            ));
        }
        Some(prompt)
    }

    /// Generates a task from the agent's instructions (or role/goal when no
    /// instructions were given). Used by the orchestrator when no tasks are
    /// registered.
    pub fn generate_task(&self) -> Task {
        let description = self
            .instructions
            .clone()
            .unwrap_or_else(|| format!("Execute task as {} with goal: {}", self.role, self.goal));
        Task::new(description, "Complete the assigned task successfully")
            .with_name(format!("{}_task", self.name))
            .with_agent(self.name.clone())
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("self_reflect", &self.self_reflect)
            .field("history_len", &self.chat_history.len())
            .finish()
    }
}
