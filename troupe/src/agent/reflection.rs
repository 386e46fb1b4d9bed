//! Self-reflection: the agent critiques its own response and optionally
//! regenerates it.
//!
//! Runs only when `self_reflect` is set and the call has no output schema.
//! Each round asks for `{reflection, satisfactory}` through the structured
//! endpoint (on `reflect_llm` when configured); "satisfactory: yes" is
//! accepted only after `min_reflect` rounds, and `max_reflect` bounds the
//! loop, returning the current response unmodified. Structured parsing and
//! regeneration are separate calls — the structured pass never streams.

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::llm::ChatRequest;
use crate::message::Message;

use super::chat::guarded;
use super::{Agent, ChatOptions};

/// Schema for one reflection round.
static REFLECTION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "reflection": {"type": "string"},
            "satisfactory": {"type": "string", "enum": ["yes", "no"]}
        },
        "required": ["reflection", "satisfactory"]
    })
});

impl Agent {
    /// Reflection loop over the working message list.
    ///
    /// `messages` already ends with the assistant response under review;
    /// reflection prompts and summaries are appended here but stay transient
    /// to the chat call. Returns the accepted (or last) response text.
    pub(crate) async fn run_reflection(
        &self,
        messages: &mut Vec<Message>,
        mut response_text: String,
        opts: &ChatOptions,
    ) -> Result<String, RuntimeError> {
        let reflect_llm = self.reflect_llm.as_ref().unwrap_or(&self.llm);
        let reflect_model = self
            .reflect_model
            .clone()
            .unwrap_or_else(|| self.model.clone());

        let mut count: u32 = 0;
        loop {
            let reflection_prompt = format!(
                "Reflect on your previous response: '{}'.\n\
                 Identify any flaws, improvements, or actions.\n\
                 Provide a \"satisfactory\" status ('yes' or 'no').\n\
                 Output MUST be JSON with 'reflection' and 'satisfactory'.",
                response_text
            );
            debug!(agent = %self.name, attempt = count + 1, "reflection round");
            messages.push(Message::user(reflection_prompt));

            let request = ChatRequest::new(reflect_model.clone(), messages.clone())
                .with_temperature(opts.temperature());
            match guarded(&opts.cancel, reflect_llm.structured(&request, &REFLECTION_SCHEMA)).await {
                Ok(value) => {
                    let reflection = value
                        .get("reflection")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let satisfactory = value
                        .get("satisfactory")
                        .and_then(Value::as_str)
                        .unwrap_or("no")
                        .to_lowercase();
                    messages.push(Message::assistant(format!(
                        "Self Reflection: {} Satisfactory?: {}",
                        reflection, satisfactory
                    )));

                    // "yes" counts only once the minimum rounds have run.
                    if satisfactory == "yes" && count >= self.min_reflect.saturating_sub(1) {
                        debug!(agent = %self.name, rounds = count + 1, "reflection accepted");
                        return Ok(response_text);
                    }
                    if count >= self.max_reflect.saturating_sub(1) {
                        debug!(agent = %self.name, "max reflections reached, keeping response");
                        return Ok(response_text);
                    }

                    messages.push(Message::user(
                        "Now regenerate your response using the reflection you made",
                    ));
                    let regen = ChatRequest::new(self.model.clone(), messages.clone())
                        .with_temperature(opts.temperature());
                    let response = self.chat_once(&regen, &opts.cancel).await?;
                    messages.push(Message::assistant(response.content.clone()));
                    response_text = response.content;
                    count += 1;
                }
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(e) => {
                    // A failed parse costs one attempt and the loop goes on.
                    warn!(agent = %self.name, error = %e, "reflection parse failed");
                    messages.push(Message::assistant("Self Reflection failed."));
                    count += 1;
                    if count >= self.max_reflect {
                        return Ok(response_text);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::message::Role;
    use serde_json::json;
    use std::sync::Arc;

    fn no() -> Value {
        json!({"reflection": "could be better", "satisfactory": "no"})
    }

    fn yes() -> Value {
        json!({"reflection": "looks right", "satisfactory": "yes"})
    }

    /// **Scenario**: with min=1/max=3 and a model that never approves, the
    /// loop runs exactly three reflection rounds, the final answer is the
    /// third chat response, and history grows by exactly two records.
    #[tokio::test]
    async fn reflection_cap_returns_third_attempt() {
        let llm = Arc::new(
            MockLlm::with_replies(vec![
                MockLlm::text("draft one"),
                MockLlm::text("draft two"),
                MockLlm::text("draft three"),
            ])
            .push_structured(no()),
        );
        let mut agent =
            Agent::new("A", "mock/model", llm.clone()).with_self_reflection(1, 3);

        let reply = agent.chat("write", ChatOptions::default()).await.unwrap();

        assert_eq!(reply, "draft three");
        assert_eq!(llm.structured_count(), 3);
        assert_eq!(llm.chat_count(), 3);
        assert_eq!(agent.chat_history.len(), 2);
        assert_eq!(agent.chat_history[0].role, Role::User);
        assert_eq!(agent.chat_history[1].content.as_text(), "draft three");
    }

    /// **Scenario**: an early "yes" before min_reflect does not end the loop.
    #[tokio::test]
    async fn min_reflect_defers_early_yes() {
        let llm = Arc::new(
            MockLlm::with_replies(vec![MockLlm::text("first"), MockLlm::text("second")])
                .push_structured(yes())
                .push_structured(yes()),
        );
        let mut agent =
            Agent::new("A", "mock/model", llm.clone()).with_self_reflection(2, 3);

        let reply = agent.chat("write", ChatOptions::default()).await.unwrap();

        // Round 1: yes but count < min → regenerate. Round 2: yes accepted.
        assert_eq!(reply, "second");
        assert_eq!(llm.structured_count(), 2);
        assert_eq!(llm.chat_count(), 2);
    }

    /// **Scenario**: a satisfied first round returns the original response.
    #[tokio::test]
    async fn satisfied_first_round_keeps_response() {
        let llm = Arc::new(
            MockLlm::with_replies(vec![MockLlm::text("good enough")]).push_structured(yes()),
        );
        let mut agent =
            Agent::new("A", "mock/model", llm.clone()).with_self_reflection(1, 3);
        let reply = agent.chat("write", ChatOptions::default()).await.unwrap();
        assert_eq!(reply, "good enough");
        assert_eq!(llm.chat_count(), 1);
    }

    /// **Scenario**: parse failures consume attempts and the last response
    /// survives.
    #[tokio::test]
    async fn parse_failures_consume_attempts() {
        // Null entries in the structured queue are parse failures.
        let llm = Arc::new(
            MockLlm::with_replies(vec![MockLlm::text("only draft")]).push_structured(Value::Null),
        );
        let mut agent =
            Agent::new("A", "mock/model", llm.clone()).with_self_reflection(1, 2);
        let reply = agent.chat("write", ChatOptions::default()).await.unwrap();
        assert_eq!(reply, "only draft");
        assert_eq!(llm.structured_count(), 2);
        assert_eq!(agent.chat_history.len(), 2);
    }

    /// **Scenario**: schema outputs bypass reflection entirely.
    #[tokio::test]
    async fn schema_output_skips_reflection() {
        let llm = Arc::new(MockLlm::reply("{\"k\": 1}"));
        let mut agent =
            Agent::new("A", "mock/model", llm.clone()).with_self_reflection(1, 3);
        let opts = ChatOptions {
            output: crate::task::OutputSchema::Json(json!({"type": "object"})),
            ..Default::default()
        };
        agent.chat("go", opts).await.unwrap();
        assert_eq!(llm.structured_count(), 0);
    }
}
