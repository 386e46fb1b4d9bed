//! LLM client abstraction.
//!
//! The runtime depends on a callable that turns messages into assistant text
//! plus optional tool calls; this module defines the trait, the request and
//! response types, and re-exports the implementations: [`MockLlm`] (scripted,
//! for tests) and [`OpenAiChat`] (OpenAI-compatible HTTP endpoint).
//!
//! # Streaming
//!
//! `chat_stream()` accepts an optional `Sender<MessageChunk>`; implementations
//! that stream send tokens through the channel as they arrive, and the method
//! still returns the complete [`LlmResponse`] at the end. The default
//! implementation calls `chat()` and emits the full content as one chunk, so
//! callers that concatenate chunks observe identical text either way. Only
//! the final full response is ever committed to an agent's history.
//!
//! # Structured output
//!
//! `structured()` parses the reply against a declared JSON schema. The
//! default implementation appends a bare-JSON instruction, fence-cleans the
//! reply, and parses; providers with a native structured endpoint override it.

mod mock;
mod openai;

pub use mock::{MockLlm, RecordedCall};
pub use openai::OpenAiChat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::message::Message;
use crate::task::clean_json_fences;
use crate::tools::ToolSpec;

/// One tool invocation emitted by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmToolCall {
    /// Call id; echoed back in the tool-result message.
    pub id: String,
    /// Tool name as registered with the agent.
    pub name: String,
    /// Arguments as a JSON string; parsed before execution.
    pub arguments: String,
}

/// Token usage for one call, when the provider reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from one chat completion.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Assistant message content (plain text).
    pub content: String,
    /// Tool calls from this turn; empty means a final answer.
    pub tool_calls: Vec<LlmToolCall>,
    /// Usage, when available.
    pub usage: Option<LlmUsage>,
}

/// One streamed text chunk.
#[derive(Debug, Clone)]
pub struct MessageChunk {
    pub content: String,
}

/// Input to one chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier, provider-prefixed accepted (`"openai/gpt-4o-mini"`).
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// Tool schemas offered to the model; empty disables tool calling.
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.2,
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// LLM client: messages in, assistant text and optional tool calls out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion turn.
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, RuntimeError>;

    /// Streaming variant. Default: run `chat()` and emit the content as a
    /// single chunk when a sender is given.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, RuntimeError> {
        let response = self.chat(request).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }

    /// Structured completion: the reply is parsed against `schema` before the
    /// caller sees it.
    ///
    /// Default implementation appends a bare-JSON instruction to the last
    /// user message, fence-cleans, and parses; a parse failure is
    /// `RuntimeError::Schema`.
    async fn structured(
        &self,
        request: &ChatRequest,
        schema: &Value,
    ) -> Result<Value, RuntimeError> {
        let mut request = request.clone();
        let instruction = format!(
            "\nReturn ONLY a JSON object that matches this schema: {}",
            schema
        );
        match request.messages.iter_mut().rev().find(|m| m.tool_call_id.is_none()) {
            Some(last) => last.content.append_text(&instruction),
            None => request.messages.push(Message::user(instruction)),
        }
        let response = self.chat(&request).await?;
        let cleaned = clean_json_fences(&response.content);
        serde_json::from_str(&cleaned)
            .map_err(|e| RuntimeError::Schema(format!("structured output parse: {}", e)))
    }
}
