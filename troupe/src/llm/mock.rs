//! Mock LLM for tests and examples.
//!
//! Replies come from a scripted queue (last reply repeats when the queue runs
//! dry), structured outputs from their own queue, and every request is
//! recorded so tests can assert on the exact messages an agent or
//! orchestrator sent.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::message::Message;

use super::{ChatRequest, LlmClient, LlmResponse, LlmToolCall, MessageChunk};

/// One recorded request, chat or structured.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
    /// Tool names offered on this call.
    pub tool_names: Vec<String>,
    /// Set for `structured()` calls.
    pub structured: bool,
}

impl RecordedCall {
    /// Concatenated text of all messages; convenient for `contains` asserts.
    pub fn all_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Scripted LLM: fixed reply queue plus structured-output queue.
///
/// `MockLlm::reply("hi")` answers every chat with the same text;
/// `with_replies` scripts a sequence (`push_tool_call` inserts a tool-calling
/// turn). `push_structured` scripts `structured()` results — an explicit
/// `Value::Null` entry simulates a parse failure.
#[derive(Default)]
pub struct MockLlm {
    replies: Mutex<Vec<LlmResponse>>,
    structured: Mutex<Vec<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// When true, chat_stream sends each character as its own chunk.
    stream_by_char: bool,
}

impl MockLlm {
    /// Mock answering every chat with the same text and no tool calls.
    pub fn reply(content: impl Into<String>) -> Self {
        Self::with_replies(vec![LlmResponse {
            content: content.into(),
            ..Default::default()
        }])
    }

    /// Mock with a scripted reply sequence; the last reply repeats.
    pub fn with_replies(replies: Vec<LlmResponse>) -> Self {
        Self {
            replies: Mutex::new(replies),
            ..Default::default()
        }
    }

    /// Builds a text reply for `with_replies`.
    pub fn text(content: impl Into<String>) -> LlmResponse {
        LlmResponse {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Builds a tool-calling reply for `with_replies`.
    pub fn tool_call(
        name: impl Into<String>,
        arguments: impl Into<String>,
        id: impl Into<String>,
    ) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            tool_calls: vec![LlmToolCall {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
            usage: None,
        }
    }

    /// Queues one structured() result (builder).
    pub fn push_structured(self, value: Value) -> Self {
        self.structured.lock().unwrap().push(value);
        self
    }

    /// Enables character-by-character streaming (builder).
    pub fn with_stream_by_char(mut self) -> Self {
        self.stream_by_char = true;
        self
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of chat (non-structured) requests so far.
    pub fn chat_count(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| !c.structured).count()
    }

    /// Number of structured requests so far.
    pub fn structured_count(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.structured).count()
    }

    fn record(&self, request: &ChatRequest, structured: bool) {
        self.calls.lock().unwrap().push(RecordedCall {
            model: request.model.clone(),
            messages: request.messages.clone(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            structured,
        });
    }

    fn next_reply(&self) -> LlmResponse {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies.first().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, RuntimeError> {
        self.record(request, false);
        Ok(self.next_reply())
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, RuntimeError> {
        let response = self.chat(request).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                if self.stream_by_char {
                    for c in response.content.chars() {
                        let _ = tx.send(MessageChunk { content: c.to_string() }).await;
                    }
                } else {
                    let _ = tx
                        .send(MessageChunk {
                            content: response.content.clone(),
                        })
                        .await;
                }
            }
        }
        Ok(response)
    }

    async fn structured(
        &self,
        request: &ChatRequest,
        _schema: &Value,
    ) -> Result<Value, RuntimeError> {
        self.record(request, true);
        let mut queue = self.structured.lock().unwrap();
        let value = if queue.len() > 1 {
            queue.remove(0)
        } else {
            queue.first().cloned().unwrap_or(Value::Null)
        };
        if value.is_null() {
            return Err(RuntimeError::Schema(
                "mock structured output exhausted".into(),
            ));
        }
        Ok(value)
    }
}
