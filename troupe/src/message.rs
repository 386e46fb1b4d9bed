//! Conversation message types.
//!
//! Roles: System, User, Assistant, Tool. Content is either plain text or an
//! array of parts (multimodal), so both `"hello"` and
//! `[{"type":"text",...},{"type":"image_url",...}]` shapes are representable.
//! Assistant messages may carry tool calls; tool messages carry the
//! `tool_call_id` they answer.

use serde::{Deserialize, Serialize};

use crate::llm::LlmToolCall;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt; typically first in the list.
    System,
    /// User input (task prompt, tool feedback requests).
    User,
    /// Model reply, possibly with tool calls.
    Assistant,
    /// Tool result answering one tool call.
    Tool,
}

/// One part of a multimodal content array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text segment.
    Text { text: String },
    /// Image reference: remote URL or `data:image/...;base64,` URL.
    ImageUrl { image_url: ImageUrl },
}

/// Image URL wrapper matching the chat-completion wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image part from a URL (remote or data URL).
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Message content: a plain string or an array of parts.
///
/// Deserializes from either shape so histories written by other runtimes
/// load without "invalid type: sequence, expected a string".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Returns the text of this content: the string variant as-is, or the
    /// concatenation of all text parts. Image parts are skipped.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Appends `suffix` to the text, or to the first text part for
    /// multimodal content. A parts list without any text part gains one.
    pub fn append_text(&mut self, suffix: &str) {
        match self {
            MessageContent::Text(s) => s.push_str(suffix),
            MessageContent::Parts(parts) => {
                for p in parts.iter_mut() {
                    if let ContentPart::Text { text } = p {
                        text.push_str(suffix);
                        return;
                    }
                }
                parts.insert(0, ContentPart::text(suffix));
            }
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// A single message in a conversation or chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    /// Tool calls attached to an assistant message; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<LlmToolCall>,
    /// Id of the tool call a `Role::Tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Creates an assistant message without tool calls.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Creates an assistant message carrying the tool calls the model emitted.
    pub fn assistant_with_tool_calls(
        content: impl Into<MessageContent>,
        tool_calls: Vec<LlmToolCall>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Creates a tool-result message answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Input to a chat call: plain text or multimodal parts.
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Prompt {
    /// Text view of the prompt (image parts skipped). Used for knowledge
    /// queries and logging.
    pub fn as_text(&self) -> String {
        match self {
            Prompt::Text(s) => s.clone(),
            Prompt::Parts(parts) => MessageContent::Parts(parts.clone()).as_text(),
        }
    }

    /// Converts into message content for the outgoing user message.
    pub fn into_content(self) -> MessageContent {
        match self {
            Prompt::Text(s) => MessageContent::Text(s),
            Prompt::Parts(parts) => MessageContent::Parts(parts),
        }
    }
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::Text(s)
    }
}

impl From<Vec<ContentPart>> for Prompt {
    fn from(parts: Vec<ContentPart>) -> Self {
        Prompt::Parts(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Role constructors produce the correct role and content.
    #[test]
    fn message_constructors_set_role_and_content() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        let t = Message::tool("call-1", "out");
        assert_eq!(t.role, Role::Tool);
        assert_eq!(t.tool_call_id.as_deref(), Some("call-1"));
    }

    /// **Scenario**: Content round-trips through serde for both shapes.
    #[test]
    fn message_content_serde_roundtrip_string_and_parts() {
        let text: MessageContent = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text.as_text(), "hello");

        let parts: MessageContent = serde_json::from_str(
            r#"[{"type":"text","text":"a"},{"type":"image_url","image_url":{"url":"http://x/y.png"}},{"type":"text","text":"b"}]"#,
        )
        .unwrap();
        assert_eq!(parts.as_text(), "ab");

        let json = serde_json::to_string(&parts).unwrap();
        let back: MessageContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_text(), "ab");
    }

    /// **Scenario**: append_text hits the first text part of a multimodal
    /// content, and inserts one when only images are present.
    #[test]
    fn append_text_targets_first_text_part() {
        let mut content = MessageContent::Parts(vec![
            ContentPart::image_url("http://x/a.png"),
            ContentPart::text("prompt"),
        ]);
        content.append_text(" extra");
        assert_eq!(content.as_text(), "prompt extra");

        let mut images_only = MessageContent::Parts(vec![ContentPart::image_url("http://x/a.png")]);
        images_only.append_text("note");
        assert_eq!(images_only.as_text(), "note");
    }

    /// **Scenario**: Prompt::as_text works for both variants.
    #[test]
    fn prompt_as_text_for_text_and_parts() {
        assert_eq!(Prompt::from("hi").as_text(), "hi");
        let p = Prompt::Parts(vec![ContentPart::text("x"), ContentPart::image_url("u")]);
        assert_eq!(p.as_text(), "x");
    }
}
