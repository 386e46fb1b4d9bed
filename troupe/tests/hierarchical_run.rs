//! Integration test: hierarchical dispatch — the manager model picks tasks
//! and agents via structured output.


use std::sync::Arc;

use serde_json::json;
use troupe::{Agent, MockLlm, Orchestrator, ProcessKind, Task, TaskStatus};

/// The manager executes its own planning task, then dispatches the work
/// task to the named agent and stops once everything is complete.
#[tokio::test]
async fn manager_dispatches_work_to_named_agent() {
    // The manager LLM answers the manager task's chat, then issues one
    // structured instruction selecting task 0 for the Specialist.
    let manager_llm = Arc::new(
        MockLlm::reply("I will dispatch the analysis first.").push_structured(json!({
            "task_id": 0,
            "agent_name": "Specialist",
            "action": "execute"
        })),
    );
    let specialist_llm = Arc::new(MockLlm::reply("analysis complete"));

    let mut orch = Orchestrator::new()
        .with_process(ProcessKind::Hierarchical)
        .with_manager_llm(manager_llm.clone(), "mock/manager");
    orch.register_agent(Agent::new("Specialist", "mock/model", specialist_llm.clone()));

    // No agent assigned: the manager picks one.
    let work = orch.register_task(Task::new("analyze the data", "an analysis"));

    let report = orch.start(None).await.unwrap();

    assert_eq!(report.statuses[&work], TaskStatus::Completed);
    assert_eq!(report.results[&work].raw, "analysis complete");
    assert_eq!(report.results[&work].agent.as_deref(), Some("Specialist"));

    // The manager task was registered after the work task and completed too.
    let manager_id = work + 1;
    assert_eq!(report.statuses[&manager_id], TaskStatus::Completed);

    // The structured call carried the task snapshot.
    let structured: Vec<_> = manager_llm
        .requests()
        .into_iter()
        .filter(|r| r.structured)
        .collect();
    assert_eq!(structured.len(), 1);
    let snapshot = structured[0].all_text();
    assert!(snapshot.contains("analyze the data"));
    assert!(snapshot.contains("manager_task"));
}

/// A stop instruction ends the run with pending tasks left untouched.
#[tokio::test]
async fn manager_stop_leaves_pending_tasks() {
    let manager_llm = Arc::new(MockLlm::reply("Nothing to do.").push_structured(json!({
        "task_id": 0,
        "agent_name": "Specialist",
        "action": "stop"
    })));
    let specialist_llm = Arc::new(MockLlm::reply("never used"));

    let mut orch = Orchestrator::new()
        .with_process(ProcessKind::Hierarchical)
        .with_manager_llm(manager_llm, "mock/manager");
    orch.register_agent(Agent::new("Specialist", "mock/model", specialist_llm.clone()));
    let work = orch.register_task(Task::new("deferred work", "out"));

    let report = orch.start(None).await.unwrap();

    assert_eq!(report.statuses[&work], TaskStatus::NotStarted);
    assert_eq!(specialist_llm.chat_count(), 0);
    // The manager task still completed.
    assert_eq!(report.statuses[&(work + 1)], TaskStatus::Completed);
}
