//! Integration test: sequential runs end-to-end with scripted LLMs.
//!
//! Covers the two-agent run with automatic context passing, auto-generated
//! tasks, output files, and completion callbacks.


use std::sync::{Arc, Mutex};

use troupe::{
    Agent, ContextItem, MockLlm, Orchestrator, ProcessKind, Task, TaskStatus,
};

/// Two agents, two tasks, no explicit wiring: both complete and the second
/// task's prompt carries the first task's result.
#[tokio::test]
async fn two_agent_run_passes_context_forward() {
    let researcher_llm = Arc::new(MockLlm::reply("2, 3, 5"));
    let writer_llm = Arc::new(MockLlm::reply("primes in mist\nthree small numbers hum\nquiet arithmetic"));

    let mut orch = Orchestrator::new().with_process(ProcessKind::Sequential);
    orch.register_agent(
        Agent::new("Researcher", "mock/model", researcher_llm.clone()).with_role("Researcher"),
    );
    orch.register_agent(Agent::new("Writer", "mock/model", writer_llm.clone()).with_role("Writer"));

    let t1 = orch.register_task(
        Task::new("Find 3 prime numbers", "A comma-separated list").with_agent("Researcher"),
    );
    let t2 = orch.register_task(
        Task::new("Write a haiku using them", "A haiku").with_agent("Writer"),
    );

    let report = orch.start(None).await.unwrap();

    assert_eq!(report.statuses[&t1], TaskStatus::Completed);
    assert_eq!(report.statuses[&t2], TaskStatus::Completed);
    assert_eq!(report.results[&t1].raw, "2, 3, 5");

    // The writer's prompt inlined the researcher's result.
    let writer_prompt = writer_llm.requests()[0].all_text();
    assert!(writer_prompt.contains("Write a haiku using them"));
    assert!(writer_prompt.contains("Result of previous task"));
    assert!(writer_prompt.contains("2, 3, 5"));
    assert!(writer_prompt.contains("Please provide only the final result of your work."));

    // The researcher saw no context section.
    let researcher_prompt = researcher_llm.requests()[0].all_text();
    assert!(!researcher_prompt.contains("Context:"));
}

/// With no tasks registered, one task per agent is generated from its
/// instructions and the run completes.
#[tokio::test]
async fn auto_generates_tasks_from_agents() {
    let llm = Arc::new(MockLlm::reply("summary text"));
    let mut orch = Orchestrator::new();
    orch.register_agent(
        Agent::new("Summarizer", "mock/model", llm.clone())
            .with_instructions("Summarize the quarterly report"),
    );

    let report = orch.start(None).await.unwrap();
    assert_eq!(report.statuses.len(), 1);
    assert_eq!(report.statuses[&0], TaskStatus::Completed);
    assert!(llm.requests()[0]
        .all_text()
        .contains("Summarize the quarterly report"));
}

/// An initial context string reaches every task's prompt.
#[tokio::test]
async fn initial_context_reaches_all_tasks() {
    let llm = Arc::new(MockLlm::reply("done"));
    let mut orch = Orchestrator::new();
    orch.register_agent(Agent::new("Worker", "mock/model", llm.clone()));
    orch.register_task(Task::new("handle the topic", "out").with_agent("Worker"));

    orch.start(Some(ContextItem::Text("topic: volcanoes".into())))
        .await
        .unwrap();
    let prompt = llm.requests()[0].all_text();
    assert!(prompt.contains("Input Content:\ntopic: volcanoes"));
}

/// Output files are written on completion, creating directories on demand.
#[tokio::test]
async fn output_file_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/result.txt");

    let llm = Arc::new(MockLlm::reply("persisted result"));
    let mut orch = Orchestrator::new();
    orch.register_agent(Agent::new("Worker", "mock/model", llm));
    orch.register_task(
        Task::new("write it down", "text")
            .with_agent("Worker")
            .with_output_file(&path, true),
    );

    orch.start(None).await.unwrap();
    assert_eq!(
        tokio::fs::read_to_string(&path).await.unwrap(),
        "persisted result"
    );
}

/// Completion callbacks receive the produced output.
#[tokio::test]
async fn callback_runs_on_completion() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);

    let llm = Arc::new(MockLlm::reply("callback payload"));
    let mut orch = Orchestrator::new();
    orch.register_agent(Agent::new("Worker", "mock/model", llm));
    orch.register_task(
        Task::new("notify me", "out")
            .with_agent("Worker")
            .with_callback(move |output| {
                let seen = Arc::clone(&seen_cb);
                async move {
                    seen.lock().unwrap().push(output.raw);
                }
            }),
    );

    orch.start(None).await.unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), &["callback payload"]);
}

/// A task whose agent name is unknown fails and the run still returns a
/// report for the rest.
#[tokio::test]
async fn unknown_agent_fails_task_run_continues() {
    let llm = Arc::new(MockLlm::reply("fine"));
    let mut orch = Orchestrator::new().with_max_retries(3);
    orch.register_agent(Agent::new("Worker", "mock/model", llm));
    let bad = orch.register_task(Task::new("orphaned", "out").with_agent("Nobody"));
    let good = orch.register_task(Task::new("useful", "out").with_agent("Worker"));

    let report = orch.start(None).await.unwrap();
    assert_eq!(report.statuses[&bad], TaskStatus::Failed);
    assert_eq!(report.statuses[&good], TaskStatus::Completed);
}
