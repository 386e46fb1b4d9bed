//! Hierarchical process: a manager agent decides dispatch order.
//!
//! A transient manager task is registered first (and executed once like any
//! task); from then on every step snapshots the non-manager tasks and asks
//! the manager model, via structured output, which task to execute next and
//! by which agent. `stop`, a parse failure, or an invalid task id end the
//! run cleanly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::error::RuntimeError;
use crate::llm::{ChatRequest, LlmClient};
use crate::message::Message;
use crate::task::{Task, TaskRegistry, TaskStatus};

use super::Process;

/// Reserved name of the transient manager task.
pub const MANAGER_TASK_NAME: &str = "manager_task";

fn manager_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_id": {"type": "integer"},
            "agent_name": {"type": "string"},
            "action": {"type": "string", "enum": ["execute", "stop"]}
        },
        "required": ["task_id", "agent_name", "action"]
    })
}

/// Manager-driven dispatch.
pub struct HierarchicalProcess {
    manager_llm: Arc<dyn LlmClient>,
    manager_model: String,
    /// Name of the transient manager agent registered by the orchestrator.
    manager_agent: String,
    /// Known agent names; rebinding only happens for these.
    agent_names: Vec<String>,
    manager_task_id: Option<usize>,
    total: usize,
    completed: usize,
    done: bool,
}

impl HierarchicalProcess {
    pub fn new(
        manager_llm: Arc<dyn LlmClient>,
        manager_model: impl Into<String>,
        manager_agent: impl Into<String>,
        agent_names: Vec<String>,
    ) -> Self {
        Self {
            manager_llm,
            manager_model: manager_model.into(),
            manager_agent: manager_agent.into(),
            agent_names,
            manager_task_id: None,
            total: 0,
            completed: 0,
            done: false,
        }
    }

    fn finish(&mut self, registry: &mut TaskRegistry) {
        if let Some(id) = self.manager_task_id {
            if let Some(task) = registry.get_mut(id) {
                task.status = TaskStatus::Completed;
            }
        }
        self.done = true;
        info!(completed = self.completed, total = self.total, "hierarchical execution finished");
    }

    fn tasks_summary(&self, registry: &TaskRegistry) -> Vec<Value> {
        registry
            .iter()
            .filter(|t| t.name.as_deref() != Some(MANAGER_TASK_NAME))
            .map(|t| {
                json!({
                    "task_id": t.id,
                    "name": t.display_name(),
                    "description": t.description,
                    "status": t.status.to_string(),
                    "agent": t.agent.clone().unwrap_or_else(|| "No agent".to_string()),
                })
            })
            .collect()
    }

    async fn ask_manager(&self, registry: &TaskRegistry) -> Result<Value, RuntimeError> {
        let summary = self.tasks_summary(registry);
        let manager_prompt = format!(
            "Here is the current status of all tasks except yours ({}):\n{}\n\n\
             Provide a JSON with the structure:\n\
             {{\n   \"task_id\": <int>,\n   \"agent_name\": \"<string>\",\n   \"action\": \"<execute or stop>\"\n}}",
            MANAGER_TASK_NAME,
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
        let system = registry
            .find_by_name(MANAGER_TASK_NAME)
            .and_then(|id| registry.get(id))
            .map(|t| t.description.clone())
            .unwrap_or_default();
        let request = ChatRequest::new(
            self.manager_model.clone(),
            vec![Message::system(system), Message::user(manager_prompt)],
        )
        .with_temperature(0.7);
        self.manager_llm.structured(&request, &manager_schema()).await
    }
}

#[async_trait]
impl Process for HierarchicalProcess {
    async fn next_task(
        &mut self,
        registry: &mut TaskRegistry,
    ) -> Result<Option<usize>, RuntimeError> {
        if self.done {
            return Ok(None);
        }

        // First call: register the manager task and run it once.
        if self.manager_task_id.is_none() {
            let manager_task = Task::new(
                "Decide the order of tasks and which agent executes them",
                "All tasks completed successfully",
            )
            .with_name(MANAGER_TASK_NAME)
            .with_agent(self.manager_agent.clone());
            let id = registry.register(manager_task);
            self.manager_task_id = Some(id);
            self.total = registry.len() - 1;
            info!(total = self.total, "hierarchical run, manager task registered");
            if self.total == 0 {
                self.finish(registry);
                return Ok(None);
            }
            return Ok(Some(id));
        }

        loop {
            if self.completed >= self.total {
                self.finish(registry);
                return Ok(None);
            }

            let instructions = match self.ask_manager(registry).await {
                Ok(v) => v,
                Err(e) => {
                    error!(error = %e, "manager decision failed, ending run");
                    self.finish(registry);
                    return Ok(None);
                }
            };
            debug!(instructions = %instructions, "manager instructions");

            let action = instructions
                .get("action")
                .and_then(Value::as_str)
                .unwrap_or("stop")
                .to_lowercase();
            if action == "stop" {
                info!("manager decided to stop task execution");
                self.finish(registry);
                return Ok(None);
            }

            let selected = instructions
                .get("task_id")
                .and_then(Value::as_u64)
                .map(|id| id as usize);
            let selected = match selected {
                Some(id) if registry.get(id).is_some() && Some(id) != self.manager_task_id => id,
                other => {
                    error!(task_id = ?other, "manager selected an invalid task id, ending run");
                    self.finish(registry);
                    return Ok(None);
                }
            };

            // Rebind to the named agent when it exists.
            if let Some(agent_name) = instructions.get("agent_name").and_then(Value::as_str) {
                if self.agent_names.iter().any(|n| n == agent_name) {
                    if let Some(task) = registry.get_mut(selected) {
                        if task.agent.as_deref() != Some(agent_name) {
                            debug!(task = selected, agent = agent_name, "manager rebound task agent");
                            task.agent = Some(agent_name.to_string());
                        }
                    }
                }
            }

            let status = registry.get(selected).map(|t| t.status);
            if status == Some(TaskStatus::Completed) {
                // Already done; count it and ask again.
                self.completed += 1;
                continue;
            }
            return Ok(Some(selected));
        }
    }

    fn observe(&mut self, id: usize, registry: &mut TaskRegistry) {
        if Some(id) == self.manager_task_id {
            return;
        }
        if registry.get(id).map(|t| t.status) == Some(TaskStatus::Completed) {
            self.completed += 1;
            debug!(completed = self.completed, total = self.total, "task completed under manager");
        }
    }
}
