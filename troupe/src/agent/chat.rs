//! Agent chat: message assembly and the tool-call loop.
//!
//! One `chat` call runs: assemble messages (system prompt, history,
//! knowledge augmentation, schema instruction, user prompt) → LLM with tool
//! schemas → execute any tool calls and feed results back → final pass
//! without tools → optional self-reflection. Tool and reflection messages
//! are transient to the call; on success exactly one user record (the
//! original prompt) and one assistant record are committed to
//! `chat_history`.

use std::future::Future;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::knowledge::KnowledgeScope;
use crate::llm::{ChatRequest, LlmResponse, MessageChunk};
use crate::message::{Message, Prompt};

use super::{Agent, ChatOptions};

/// Literal instruction appended to the user content for schema outputs.
const JSON_ONLY_INSTRUCTION: &str = "\nReturn ONLY a valid JSON object. No other text or explanation.";

/// Tool-result sentinel for empty returns.
const EMPTY_TOOL_OUTPUT: &str = "Function returned an empty output";

/// Runs `fut` under the caller's cancellation token, if any.
pub(crate) async fn guarded<T, F>(
    cancel: &Option<CancellationToken>,
    fut: F,
) -> Result<T, RuntimeError>
where
    F: Future<Output = Result<T, RuntimeError>>,
{
    match cancel {
        Some(token) => {
            if token.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(RuntimeError::Cancelled),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

impl Agent {
    /// One conversational turn.
    ///
    /// Returns the final assistant text. On success `chat_history` grows by
    /// exactly two records regardless of tool or reflection rounds.
    pub async fn chat(
        &mut self,
        prompt: impl Into<Prompt>,
        opts: ChatOptions,
    ) -> Result<String, RuntimeError> {
        let prompt = prompt.into();
        let original_content = prompt.clone().into_content();

        let mut messages = self.assemble_messages(prompt, &opts).await?;
        let mut response = self.tool_loop(&mut messages, &opts).await?;

        // Schema outputs skip reflection: the raw text goes straight back to
        // the caller for parsing.
        if self.self_reflect && opts.output.is_raw() {
            response = self.run_reflection(&mut messages, response, &opts).await?;
        }

        self.chat_history.push(Message::user(original_content));
        self.chat_history.push(Message::assistant(response.clone()));
        Ok(response)
    }

    /// Builds the outgoing message list: system prompt, history, knowledge
    /// augmentation, schema instruction, user message.
    async fn assemble_messages(
        &self,
        prompt: Prompt,
        opts: &ChatOptions,
    ) -> Result<Vec<Message>, RuntimeError> {
        let mut messages = Vec::new();
        if let Some(system) = self.system_prompt(&opts.output) {
            messages.push(Message::system(system));
        }
        messages.extend(self.chat_history.iter().cloned());

        let mut content = prompt.clone().into_content();

        if let Some(knowledge) = &self.knowledge {
            let scope = KnowledgeScope {
                agent_id: Some(self.id.to_string()),
                user_id: self.user_id.clone(),
            };
            match guarded(&opts.cancel, knowledge.search(&prompt.as_text(), &scope)).await {
                Ok(hits) if !hits.is_empty() => {
                    let mut seen = std::collections::HashSet::new();
                    let snippets: Vec<&str> = hits
                        .iter()
                        .map(|h| h.text.as_str())
                        .filter(|s| seen.insert(*s))
                        .collect();
                    content.append_text(&format!("\n\nKnowledge: {}", snippets.join("\n")));
                }
                Ok(_) => {}
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(e) => warn!(agent = %self.name, error = %e, "knowledge search failed"),
            }
        }

        if !opts.output.is_raw() {
            content.append_text(JSON_ONLY_INSTRUCTION);
        }

        messages.push(Message::user(content));
        Ok(messages)
    }

    /// One LLM call with a single retry on transport failure.
    pub(crate) async fn chat_once(
        &self,
        request: &ChatRequest,
        cancel: &Option<CancellationToken>,
    ) -> Result<LlmResponse, RuntimeError> {
        match guarded(cancel, self.llm.chat(request)).await {
            Ok(response) => Ok(response),
            Err(RuntimeError::Llm(first)) => {
                debug!(agent = %self.name, error = %first, "LLM call failed, retrying once");
                guarded(cancel, self.llm.chat(request)).await
            }
            Err(e) => Err(e),
        }
    }

    /// LLM round with tool schemas; executes tool calls and issues the final
    /// pass without tools. Streaming happens on the final pass only.
    async fn tool_loop(
        &self,
        messages: &mut Vec<Message>,
        opts: &ChatOptions,
    ) -> Result<String, RuntimeError> {
        let tool_specs = match &opts.tools {
            Some(names) => self.tools.specs_for(names),
            None => self.tools.specs(),
        };

        let request = ChatRequest::new(self.model.clone(), messages.clone())
            .with_temperature(opts.temperature())
            .with_tools(tool_specs);
        let response = self.chat_once(&request, &opts.cancel).await?;

        if response.tool_calls.is_empty() {
            if opts.stream {
                self.emit_chunk(opts, &response.content).await;
            }
            return Ok(response.content);
        }

        messages.push(Message::assistant_with_tool_calls(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        // Results are appended in the order the model emitted the calls.
        for call in &response.tool_calls {
            debug!(agent = %self.name, tool = %call.name, "executing tool call");
            let result = self.execute_tool_call(&call.name, &call.arguments).await;
            messages.push(Message::tool(call.id.clone(), result));
        }

        let final_request = ChatRequest::new(self.model.clone(), messages.clone())
            .with_temperature(opts.temperature());
        let final_response = if opts.stream {
            guarded(
                &opts.cancel,
                self.llm.chat_stream(&final_request, opts.chunk_tx.clone()),
            )
            .await?
        } else {
            self.chat_once(&final_request, &opts.cancel).await?
        };
        Ok(final_response.content)
    }

    /// Executes one tool call and renders the result for the model.
    ///
    /// Never fails the agent: argument parse errors and tool errors come
    /// back as `{"error": "<msg>"}` and the model decides how to recover.
    async fn execute_tool_call(&self, name: &str, arguments: &str) -> String {
        let args: Value = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => {
                return json!({"error": format!("invalid arguments: {}", e)}).to_string();
            }
        };
        match self.tools.call(name, args).await {
            Ok(value) if is_empty_output(&value) => EMPTY_TOOL_OUTPUT.to_string(),
            Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| value.to_string()),
            Err(e) => {
                warn!(agent = %self.name, tool = name, error = %e, "tool call failed");
                json!({"error": e.to_string()}).to_string()
            }
        }
    }

    async fn emit_chunk(&self, opts: &ChatOptions, content: &str) {
        if let Some(tx) = &opts.chunk_tx {
            if !content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: content.to_string(),
                    })
                    .await;
            }
        }
    }
}

fn is_empty_output(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
