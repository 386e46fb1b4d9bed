//! OpenAI-compatible chat completions client.
//!
//! Speaks the Chat Completions wire format directly over `reqwest`; field
//! names follow the [OpenAI Chat Completions API]. Works against any
//! OpenAI-compatible endpoint via the base-URL override. The structured
//! endpoint uses `response_format: json_schema` and falls back to parsing the
//! plain reply when the server rejects that parameter.
//!
//! [OpenAI Chat Completions API]: https://platform.openai.com/docs/api-reference/chat

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::{resolve_model, ProviderSettings};
use crate::error::RuntimeError;
use crate::message::{Message, MessageContent, Role};
use crate::task::clean_json_fences;

use super::{ChatRequest, LlmClient, LlmResponse, LlmToolCall, LlmUsage};

/// OpenAI-compatible chat client.
///
/// `OpenAiChat::from_model("openai/gpt-4o-mini")` resolves the API key and
/// base URL from the environment; explicit overrides win. The model carried
/// by each [`ChatRequest`] is what gets sent, with any provider prefix
/// stripped.
pub struct OpenAiChat {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiChat {
    /// Client with settings resolved from a provider-prefixed model string.
    pub fn from_model(model: &str) -> Self {
        let ProviderSettings { api_key, base_url, .. } = resolve_model(model);
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// Client for an explicit endpoint.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }

    /// Overrides the API key (builder).
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post_chat(&self, body: &WireRequest) -> Result<WireResponse, RuntimeError> {
        let url = self.chat_completions_url();
        debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tools_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            temperature = body.temperature,
            "chat completions request"
        );
        if let Ok(js) = serde_json::to_string(body) {
            trace!(url = %url, request = %js, "chat completions body");
        }

        let mut req = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| RuntimeError::Llm(format!("chat request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RuntimeError::Llm(format!("chat response read failed: {}", e)))?;
        if !status.is_success() {
            return Err(RuntimeError::Llm(format!(
                "chat completions returned {}: {}",
                status, text
            )));
        }
        trace!(url = %url, response = %text, "chat completions response");
        serde_json::from_str(&text)
            .map_err(|e| RuntimeError::Llm(format!("chat response parse failed: {}", e)))
    }

    fn build_body(request: &ChatRequest, response_format: Option<Value>) -> WireRequest {
        let (_, model) = crate::config::split_model(&request.model);
        WireRequest {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(
                    request
                        .tools
                        .iter()
                        .map(|t| WireTool {
                            kind: "function".into(),
                            function: WireFunction {
                                name: t.name.clone(),
                                description: t.description.clone(),
                                parameters: t.parameters.clone(),
                            },
                        })
                        .collect(),
                )
            },
            response_format,
        }
    }

    fn into_response(wire: WireResponse) -> Result<LlmResponse, RuntimeError> {
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::Llm("chat completions returned no choices".into()))?;
        let message = choice.message;
        Ok(LlmResponse {
            content: message.content.map(|c| c.as_text()).unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| LlmToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect(),
            usage: wire.usage.map(|u| LlmUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, RuntimeError> {
        let body = Self::build_body(request, None);
        Self::into_response(self.post_chat(&body).await?)
    }

    async fn structured(
        &self,
        request: &ChatRequest,
        schema: &Value,
    ) -> Result<Value, RuntimeError> {
        let response_format = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "schema": schema,
            }
        });
        let body = Self::build_body(request, Some(response_format));
        let response = match self.post_chat(&body).await {
            Ok(r) => r,
            Err(e) => {
                // Some OpenAI-compatible servers reject response_format; retry bare.
                warn!(error = %e, "structured response_format rejected, retrying without it");
                let body = Self::build_body(request, None);
                self.post_chat(&body).await?
            }
        };
        let parsed = Self::into_response(response)?;
        let cleaned = clean_json_fences(&parsed.content);
        serde_json::from_str(&cleaned)
            .map_err(|e| RuntimeError::Schema(format!("structured output parse: {}", e)))
    }
}

// --- wire DTOs ---------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        WireMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            },
            content: m.content.clone(),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| WireToolCall {
                            id: tc.id.clone(),
                            kind: "function".into(),
                            function: WireCallFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    function: WireCallFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
