//! Integration test: workflow runs — decision loops and CSV fan-out —
//! driven through the orchestrator with scripted LLMs.


use std::sync::{Arc, Mutex};

use serde_json::json;
use troupe::{Agent, MockLlm, Orchestrator, ProcessKind, Task, TaskStatus, TaskType};

fn recording_callback(
    log: &Arc<Mutex<Vec<String>>>,
    name: &str,
) -> impl Fn(troupe::TaskOutput) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
{
    let log = Arc::clone(log);
    let name = name.to_string();
    move |_output| {
        let log = Arc::clone(&log);
        let name = name.clone();
        Box::pin(async move {
            log.lock().unwrap().push(name);
        })
    }
}

/// Decision loop: Start routes to Do on "yes", back to Start via Do's edge,
/// and exits on "no". Execution order is Start, Do, Start, Do, Start.
#[tokio::test]
async fn decision_workflow_loops_then_exits() {
    let llm = Arc::new(MockLlm::with_replies(vec![
        MockLlm::text("{\"decision\": \"yes\"}"),
        MockLlm::text("did the work"),
        MockLlm::text("{\"decision\": \"yes\"}"),
        MockLlm::text("did the work again"),
        MockLlm::text("{\"decision\": \"no\"}"),
    ]));

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut orch = Orchestrator::new().with_process(ProcessKind::Workflow);
    orch.register_agent(Agent::new("Judge", "mock/model", llm.clone()));

    let decision_schema = json!({
        "type": "object",
        "properties": {"decision": {"type": "string"}},
        "required": ["decision"]
    });
    orch.register_task(
        Task::new("should we continue?", "yes or no")
            .with_name("Start")
            .with_agent("Judge")
            .with_task_type(TaskType::Decision)
            .start()
            .with_output_json(decision_schema)
            .on_decision("yes", vec!["Do".into()])
            .on_decision("no", vec!["exit".into()])
            .with_callback(recording_callback(&order, "Start")),
    );
    orch.register_task(
        Task::new("do the work", "work output")
            .with_name("Do")
            .with_agent("Judge")
            .with_next_tasks(vec!["Start".into()])
            .with_callback(recording_callback(&order, "Do")),
    );
    let end = orch.register_task(
        Task::new("wrap up", "closing notes")
            .with_name("End")
            .with_agent("Judge")
            .with_callback(recording_callback(&order, "End")),
    );

    let report = orch.start(None).await.unwrap();

    assert_eq!(
        order.lock().unwrap().as_slice(),
        &["Start", "Do", "Start", "Do", "Start"]
    );
    // The workflow exited cleanly; Do keeps its last execution's result.
    assert_eq!(report.results[&1].raw, "did the work again");
    // End was never reached.
    assert_eq!(report.statuses[&end], TaskStatus::NotStarted);
    assert_eq!(llm.chat_count(), 5);
}

/// CSV loop fan-out: three child tasks materialize in row order, execute in
/// that order, and the workflow ends after the last one.
#[tokio::test]
async fn csv_loop_fans_out_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("people.csv");
    tokio::fs::write(&csv, "\"Alice\"\n\"Bob\"\n\"Carol\"\n").await.unwrap();

    let llm = Arc::new(MockLlm::reply("greeted"));
    let mut orch = Orchestrator::new().with_process(ProcessKind::Workflow);
    orch.register_agent(Agent::new("Greeter", "mock/model", llm.clone()));
    orch.register_task(
        Task::new("greet each person", "a greeting")
            .with_name("seed")
            .with_agent("Greeter")
            .with_task_type(TaskType::Loop)
            .start()
            .with_input_file(&csv),
    );

    let report = orch.start(None).await.unwrap();

    // One prompt per child, in row order.
    let prompts: Vec<String> = llm.requests().iter().map(|r| r.all_text()).collect();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("You need to do the following task: Alice."));
    assert!(prompts[1].contains("You need to do the following task: Bob."));
    assert!(prompts[2].contains("You need to do the following task: Carol."));

    // Children completed; the seed task itself never ran. Workflow visits
    // reset statuses, so completion shows in the recorded results.
    assert!(report.results[&1].raw.contains("greeted"));
    assert!(report.results[&2].raw.contains("greeted"));
    assert!(report.results[&3].raw.contains("greeted"));
    assert!(!report.results.contains_key(&0));
}

/// Tasks marked async_execution + is_start run as one parallel batch before
/// the ordinary walk.
#[tokio::test]
async fn async_start_batch_runs_before_walk() {
    let fan_a = Arc::new(MockLlm::reply("fan A result"));
    let fan_b = Arc::new(MockLlm::reply("fan B result"));
    let merger = Arc::new(MockLlm::reply("merged"));

    let mut orch = Orchestrator::new().with_process(ProcessKind::Workflow);
    orch.register_agent(Agent::new("FanA", "mock/model", fan_a.clone()));
    orch.register_agent(Agent::new("FanB", "mock/model", fan_b.clone()));
    orch.register_agent(Agent::new("Merger", "mock/model", merger.clone()));

    orch.register_task(
        Task::new("gather part A", "part A")
            .with_name("a")
            .with_agent("FanA")
            .start()
            .with_async_execution()
            .with_next_tasks(vec!["merge".into()]),
    );
    orch.register_task(
        Task::new("gather part B", "part B")
            .with_name("b")
            .with_agent("FanB")
            .with_async_execution(),
    );
    orch.register_task(
        Task::new("merge the parts", "summary")
            .with_name("merge")
            .with_agent("Merger")
            .with_context(troupe::ContextItem::Task("a".into()))
            .with_context(troupe::ContextItem::Task("b".into())),
    );

    let report = orch.start(None).await.unwrap();

    // Only "a" is in the batch (b lacks is_start); after the batch the walk
    // starts at "a" again (workflow resets statuses) and proceeds to merge.
    assert!(report.results.contains_key(&0));
    let merge_prompt = merger.requests()[0].all_text();
    assert!(merge_prompt.contains("fan A result"));
    assert_eq!(report.statuses[&2], TaskStatus::NotStarted);
    assert!(report.results[&2].raw.contains("merged"));
}
