//! Integration test: memory promotion through a full run — judged quality,
//! the SQLite backend, and threshold-filtered search.


use std::sync::Arc;

use serde_json::json;
use troupe::{
    Agent, Memory, MemoryScope, MemoryStore, MockLlm, Orchestrator, SqliteMemoryStore, Task,
};

/// A task judged at accuracy 0.9 lands in both short_mem and long_mem with
/// quality 0.9; min_quality filters long-term search around it.
#[tokio::test]
async fn judged_output_promotes_to_long_term() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteMemoryStore::new(dir.path().join("memory.db")).unwrap());

    let judge = Arc::new(MockLlm::reply("unused").push_structured(json!({
        "completeness": 0.8,
        "relevance": 0.85,
        "clarity": 0.8,
        "accuracy": 0.9
    })));
    let memory = Memory::with_store(store.clone()).with_judge(judge, "mock/judge");

    let worker = Arc::new(MockLlm::reply("the verified answer"));
    let mut orch = Orchestrator::new().with_memory(memory.clone());
    orch.register_agent(Agent::new("Worker", "mock/model", worker));
    orch.register_task(Task::new("verify the claim", "a verified answer").with_agent("Worker"));

    orch.start(None).await.unwrap();

    // Promoted: present in both scopes with meta.quality = accuracy.
    let short = store
        .search(MemoryScope::ShortTerm, "verified answer", 10, 0.0)
        .await
        .unwrap();
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].record.metric("quality"), Some(0.9));
    assert_eq!(short[0].record.tag("agent_name"), Some("Worker"));

    let long = store
        .search(MemoryScope::LongTerm, "verified answer", 10, 0.0)
        .await
        .unwrap();
    assert_eq!(long.len(), 1);
    assert_eq!(long[0].record.metric("quality"), Some(0.9));

    // Quality floor on long-term search.
    assert_eq!(
        memory.search_long_term("verified answer", 10, 0.0, 0.8).await.len(),
        1
    );
    assert!(memory
        .search_long_term("verified answer", 10, 0.0, 0.95)
        .await
        .is_empty());
}

/// Without a judge the score defaults low and the output stays short-term
/// only.
#[tokio::test]
async fn unjudged_output_stays_short_term() {
    let store = Arc::new(troupe::InMemoryMemoryStore::new());
    let memory = Memory::with_store(store.clone());

    let worker = Arc::new(MockLlm::reply("an unjudged answer"));
    let mut orch = Orchestrator::new().with_memory(memory);
    orch.register_agent(Agent::new("Worker", "mock/model", worker));
    orch.register_task(Task::new("do something", "out").with_agent("Worker"));

    orch.start(None).await.unwrap();

    assert_eq!(store.len(MemoryScope::ShortTerm), 1);
    assert_eq!(store.len(MemoryScope::LongTerm), 0);
}

/// quality_check = false skips the judge entirely.
#[tokio::test]
async fn quality_check_flag_skips_judge() {
    let judge = Arc::new(MockLlm::reply("unused").push_structured(json!({
        "completeness": 1.0, "relevance": 1.0, "clarity": 1.0, "accuracy": 1.0
    })));
    let store = Arc::new(troupe::InMemoryMemoryStore::new());
    let memory = Memory::with_store(store.clone()).with_judge(judge.clone(), "mock/judge");

    let worker = Arc::new(MockLlm::reply("whatever"));
    let mut orch = Orchestrator::new().with_memory(memory);
    orch.register_agent(Agent::new("Worker", "mock/model", worker));
    orch.register_task(
        Task::new("unchecked work", "out")
            .with_agent("Worker")
            .with_quality_check(false),
    );

    orch.start(None).await.unwrap();

    assert_eq!(judge.structured_count(), 0);
    assert_eq!(store.len(MemoryScope::ShortTerm), 1);
    assert_eq!(store.len(MemoryScope::LongTerm), 0);
}
