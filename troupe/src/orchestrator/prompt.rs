//! Task prompt construction.
//!
//! A pure function over the task, the registry, and the memory/knowledge
//! handles: nothing here mutates the task, so repeated attempts and
//! workflow revisits always build from the same stored description. Context
//! lines are deduplicated preserving order.

use std::sync::Arc;

use crate::knowledge::{Knowledge, KnowledgeScope};
use crate::memory::Memory;
use crate::task::{ContextItem, Task, TaskRegistry};

/// Default number of snippets per memory section.
const MEMORY_CONTEXT_ITEMS: usize = 3;

/// Builds the full prompt text for one task execution.
pub(crate) async fn build_task_prompt(
    task: &Task,
    registry: &TaskRegistry,
    knowledge: Option<&Arc<dyn Knowledge>>,
    memory: Option<&Memory>,
    user_id: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You need to do the following task: {}.\nExpected Output: {}.",
        task.description, task.expected_output
    );

    // Workflow visits inject their "Input data from previous tasks" block
    // here instead of mutating the description.
    if let Some(input) = &task.workflow_input {
        prompt.push_str(input);
    }

    if !task.context.is_empty() {
        let mut lines: Vec<String> = Vec::new();
        for item in &task.context {
            let line = match item {
                ContextItem::Text(text) => format!("Input Content:\n{}", text),
                ContextItem::Items(items) => {
                    format!("Input Content: {}", items.join(" "))
                }
                ContextItem::Task(name) => context_task_line(name, registry),
                ContextItem::Knowledge(config) => {
                    knowledge_line(task, config, knowledge, user_id).await
                }
            };
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        prompt.push_str("\nContext:\n");
        prompt.push_str(&lines.join("\n"));
    }

    if let Some(memory) = memory {
        let context = memory
            .build_context_for_task(&task.description, user_id, None, MEMORY_CONTEXT_ITEMS)
            .await;
        if !context.is_empty() {
            prompt.push_str(&format!("\n\nRelevant memory context:\n{}", context));
        }
    }

    prompt.push_str(
        "\nPlease provide only the final result of your work. Do not add any conversation or extra explanation.",
    );
    prompt
}

fn context_task_line(name: &str, registry: &TaskRegistry) -> String {
    let referenced = registry.find_by_name(name).and_then(|id| registry.get(id));
    match referenced {
        Some(task) => match &task.result {
            Some(result) => format!(
                "Result of previous task {}:\n{}",
                task.display_name(),
                result.raw
            ),
            None => format!("Previous task {} has no result yet.", task.display_name()),
        },
        None => format!("Previous task {} has no result yet.", name),
    }
}

async fn knowledge_line(
    task: &Task,
    _config: &serde_json::Value,
    knowledge: Option<&Arc<dyn Knowledge>>,
    user_id: Option<&str>,
) -> String {
    let Some(knowledge) = knowledge else {
        return "[Vector DB Error]: no knowledge backend configured".to_string();
    };
    let scope = KnowledgeScope {
        agent_id: None,
        user_id: user_id.map(str::to_string),
    };
    match knowledge.search(&task.description, &scope).await {
        Ok(hits) => {
            let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
            format!("[DB Context]: {:?}", texts)
        }
        Err(e) => format!("[Vector DB Error]: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::StaticKnowledge;
    use crate::task::TaskOutput;

    fn registry_with_result() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        let id = registry.register(Task::new("find primes", "list").with_name("research"));
        registry.get_mut(id).unwrap().result =
            Some(TaskOutput::raw_output("find primes", "2, 3, 5".into(), None));
        registry.register(Task::new("pending work", "out").with_name("pending"));
        registry
    }

    /// **Scenario**: the prompt carries description, expected output, and
    /// the trailing final-result instruction.
    #[tokio::test]
    async fn base_prompt_shape() {
        let registry = TaskRegistry::new();
        let task = Task::new("write a haiku", "a haiku");
        let prompt = build_task_prompt(&task, &registry, None, None, None).await;
        assert!(prompt.starts_with("You need to do the following task: write a haiku.\nExpected Output: a haiku."));
        assert!(prompt.ends_with(
            "Please provide only the final result of your work. Do not add any conversation or extra explanation."
        ));
        assert!(!prompt.contains("Context:"));
    }

    /// **Scenario**: context elements render their literal forms, completed
    /// tasks inline results, pending tasks say so, duplicates collapse.
    #[tokio::test]
    async fn context_lines_render_and_dedupe() {
        let registry = registry_with_result();
        let task = Task::new("write", "out")
            .with_context(ContextItem::Text("background".into()))
            .with_context(ContextItem::Items(vec!["a".into(), "b".into()]))
            .with_context(ContextItem::Task("research".into()))
            .with_context(ContextItem::Task("research".into()))
            .with_context(ContextItem::Task("pending".into()))
            .with_context(ContextItem::Task("missing".into()));

        let prompt = build_task_prompt(&task, &registry, None, None, None).await;
        assert!(prompt.contains("\nContext:\n"));
        assert!(prompt.contains("Input Content:\nbackground"));
        assert!(prompt.contains("Input Content: a b"));
        assert!(prompt.contains("Result of previous task research:\n2, 3, 5"));
        assert_eq!(prompt.matches("Result of previous task research").count(), 1);
        assert!(prompt.contains("Previous task pending has no result yet."));
        assert!(prompt.contains("Previous task missing has no result yet."));
    }

    /// **Scenario**: knowledge descriptors inline hits, or the error line
    /// when no backend is configured.
    #[tokio::test]
    async fn knowledge_descriptor_lines() {
        let registry = TaskRegistry::new();
        let task = Task::new("look up facts", "out")
            .with_context(ContextItem::Knowledge(serde_json::json!({"collection": "docs"})));

        let missing = build_task_prompt(&task, &registry, None, None, None).await;
        assert!(missing.contains("[Vector DB Error]: no knowledge backend configured"));

        let kb: Arc<dyn Knowledge> = Arc::new(StaticKnowledge::new(vec!["a fact".into()]));
        let found = build_task_prompt(&task, &registry, Some(&kb), None, None).await;
        assert!(found.contains("[DB Context]:"));
        assert!(found.contains("a fact"));
    }

    /// **Scenario**: the workflow input block lands between the header and
    /// the context section.
    #[tokio::test]
    async fn workflow_input_is_appended() {
        let registry = TaskRegistry::new();
        let mut task = Task::new("consume", "out");
        task.workflow_input = Some("\nInput data from previous tasks:\nfeeder: stuff".into());
        let prompt = build_task_prompt(&task, &registry, None, None, None).await;
        assert!(prompt.contains("\nInput data from previous tasks:\nfeeder: stuff"));
    }

    /// **Scenario**: memory context appears under its header when non-empty.
    #[tokio::test]
    async fn memory_context_is_included() {
        let memory = Memory::with_store(Arc::new(crate::memory::InMemoryMemoryStore::new()));
        memory
            .store_short_term(
                "primes are 2 3 5",
                serde_json::Map::new(),
                crate::memory::Quality::Unscored,
            )
            .await;
        let registry = TaskRegistry::new();
        let task = Task::new("primes", "out");
        let prompt = build_task_prompt(&task, &registry, None, Some(&memory), None).await;
        assert!(prompt.contains("\n\nRelevant memory context:\n"));
        assert!(prompt.contains("ShortTerm context:"));
    }
}
