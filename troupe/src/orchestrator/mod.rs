//! Orchestrator: agent/task registries, process selection, retry loop, and
//! shared memory.
//!
//! The orchestrator owns the task registry and the shared [`Memory`] and
//! lends them to the process and agents. Registered agents are wrapped in
//! async mutexes so history appends stay linearized even when a workflow
//! start batch runs tasks concurrently. A run is: pull the next task id
//! from the process, assemble the prompt, chat, post-process, persist,
//! observe.

mod media;
mod prompt;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, ChatOptions};
use crate::config::default_manager_model;
use crate::error::RuntimeError;
use crate::knowledge::Knowledge;
use crate::llm::LlmClient;
use crate::memory::Memory;
use crate::message::{ContentPart, Prompt};
use crate::process::{
    HierarchicalProcess, Process, ProcessKind, SequentialProcess, WorkflowProcess,
};
use crate::task::{
    clean_json_fences, validate_schema, write_output_file, ContextItem, OutputFormat,
    OutputSchema, Task, TaskOutput, TaskRegistry, TaskStatus,
};

/// Name of the transient agent registered for the hierarchical manager.
const MANAGER_AGENT_NAME: &str = "Manager";

/// Pause between task attempts.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Custom completion predicate: task plus raw output → pass.
pub type CompletionChecker = Arc<dyn Fn(&Task, &str) -> bool + Send + Sync>;

/// Statuses and results of one finished run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub statuses: BTreeMap<usize, TaskStatus>,
    pub results: BTreeMap<usize, TaskOutput>,
}

/// One prepared chat dispatch (kept separate so start-batch tasks can run
/// concurrently while the registry stays borrowed only between awaits).
struct ChatJob {
    id: usize,
    agent: Arc<AsyncMutex<Agent>>,
    agent_name: String,
    prompt: Prompt,
    opts: ChatOptions,
    timeout: Option<Duration>,
}

/// Multi-agent run coordinator.
pub struct Orchestrator {
    pub run_id: Uuid,
    pub user_id: String,
    agents: HashMap<String, Arc<AsyncMutex<Agent>>>,
    agent_order: Vec<String>,
    registry: TaskRegistry,
    process: ProcessKind,
    manager_llm: Option<Arc<dyn LlmClient>>,
    manager_model: Option<String>,
    memory: Option<Memory>,
    knowledge: Option<Arc<dyn Knowledge>>,
    completion_checker: Option<CompletionChecker>,
    max_retries: u32,
    max_iter: u32,
    raw_decision_fallback: bool,
    state: DashMap<String, Value>,
    cancel: Option<CancellationToken>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user_id: "default".to_string(),
            agents: HashMap::new(),
            agent_order: Vec::new(),
            registry: TaskRegistry::new(),
            process: ProcessKind::Sequential,
            manager_llm: None,
            manager_model: None,
            memory: None,
            knowledge: None,
            completion_checker: None,
            max_retries: 5,
            max_iter: 10,
            raw_decision_fallback: true,
            state: DashMap::new(),
            cancel: None,
        }
    }

    pub fn with_process(mut self, process: ProcessKind) -> Self {
        self.process = process;
        self
    }

    /// Manager binding for the hierarchical process.
    pub fn with_manager_llm(mut self, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        self.manager_llm = Some(llm);
        self.manager_model = Some(model.into());
        self
    }

    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn Knowledge>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Retry budget per task; floored at 3.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(3);
        self
    }

    /// Workflow iteration bound; the single authoritative source, forwarded
    /// to the process.
    pub fn with_max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_completion_checker(mut self, checker: CompletionChecker) -> Self {
        self.completion_checker = Some(checker);
        self
    }

    /// Gates raw-text decision matching in workflow runs (default on).
    pub fn with_raw_decision_fallback(mut self, enabled: bool) -> Self {
        self.raw_decision_fallback = enabled;
        self
    }

    /// Caller-supplied cancellation: the current task fails without retry
    /// and the run stops at the next suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Registers an agent under its name; the run's user id propagates into
    /// the agent for knowledge scoping.
    pub fn register_agent(&mut self, mut agent: Agent) -> String {
        if agent.user_id.is_none() {
            agent.user_id = Some(self.user_id.clone());
        }
        let name = agent.name.clone();
        if self.agents.contains_key(&name) {
            warn!(agent = %name, "replacing agent registered under the same name");
        } else {
            self.agent_order.push(name.clone());
        }
        self.agents.insert(name.clone(), Arc::new(AsyncMutex::new(agent)));
        name
    }

    /// Registers a task; the returned id is its registration index.
    pub fn register_task(&mut self, task: Task) -> usize {
        self.registry.register(task)
    }

    pub fn get_status(&self, task_id: usize) -> Option<TaskStatus> {
        self.registry.get(task_id).map(|t| t.status)
    }

    pub fn get_result(&self, task_id: usize) -> Option<TaskOutput> {
        self.registry.get(task_id).and_then(|t| t.result.clone())
    }

    pub fn task(&self, task_id: usize) -> Option<&Task> {
        self.registry.get(task_id)
    }

    pub fn agent_names(&self) -> &[String] {
        &self.agent_order
    }

    // Run-scoped scratch state. `update_state` is the read-modify-write
    // helper callbacks should use when they race.

    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.insert(key.into(), value.into());
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.get(key).map(|v| v.value().clone())
    }

    /// Merges `updates` into the state map; each key is updated atomically.
    pub fn update_state(&self, updates: Map<String, Value>) {
        for (key, value) in updates {
            self.state.insert(key, value);
        }
    }

    /// Atomic read-modify-write of one key.
    pub fn update_state_with(&self, key: impl Into<String>, f: impl FnOnce(Option<&Value>) -> Value) {
        let key = key.into();
        let entry = self.state.entry(key);
        match entry {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let next = f(Some(slot.get()));
                slot.insert(next);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(f(None));
            }
        }
    }

    pub fn clear_state(&self) {
        self.state.clear();
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }

    /// Runs all registered tasks to completion (or retry exhaustion) under
    /// the configured process.
    ///
    /// `initial_context` is appended to every task's context. Under the
    /// workflow process, tasks marked `async_execution` with `is_start` run
    /// first as one parallel batch (no ordering inside the batch); the
    /// ordinary walk follows.
    pub async fn start(
        &mut self,
        initial_context: Option<ContextItem>,
    ) -> Result<RunReport, RuntimeError> {
        if self.agents.is_empty() {
            return Err(RuntimeError::Config(
                "at least one agent must be provided".into(),
            ));
        }
        info!(run_id = %self.run_id, process = ?self.process, tasks = self.registry.len(), "run starting");

        if let Some(memory) = &mut self.memory {
            memory.set_run_identity(self.run_id.to_string(), self.user_id.clone());
        }

        if self.registry.is_empty() {
            self.generate_tasks_from_agents().await;
        }
        if let Some(context) = initial_context {
            for task in self.registry.iter_mut() {
                task.context.push(context.clone());
            }
        }
        self.auto_wire_sequential();

        let mut process = self.build_process()?;

        if self.process == ProcessKind::Workflow {
            let batch: Vec<usize> = self
                .registry
                .iter()
                .filter(|t| t.async_execution && t.is_start && t.status != TaskStatus::Completed)
                .filter_map(|t| t.id)
                .collect();
            if !batch.is_empty() {
                info!(count = batch.len(), "running async start batch");
                self.run_parallel_batch(batch).await?;
            }
        }

        loop {
            if self.cancelled() {
                return Err(RuntimeError::Cancelled);
            }
            let Some(id) = process.next_task(&mut self.registry).await? else {
                break;
            };
            self.run_task(id).await?;
            process.observe(id, &mut self.registry);
        }

        info!(run_id = %self.run_id, "run finished");
        Ok(self.report())
    }

    /// Blocking wrapper around [`Orchestrator::start`]. Call from outside a
    /// tokio runtime.
    pub fn start_blocking(
        &mut self,
        initial_context: Option<ContextItem>,
    ) -> Result<RunReport, RuntimeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RuntimeError::Config(format!("runtime: {}", e)))?;
        runtime.block_on(self.start(initial_context))
    }

    fn report(&self) -> RunReport {
        let mut report = RunReport::default();
        for task in self.registry.iter() {
            let Some(id) = task.id else { continue };
            report.statuses.insert(id, task.status);
            if let Some(result) = &task.result {
                report.results.insert(id, result.clone());
            }
        }
        report
    }

    /// One auto-generated task per registered agent, in registration order.
    async fn generate_tasks_from_agents(&mut self) {
        for name in self.agent_order.clone() {
            let task = self.agents[&name].lock().await.generate_task();
            self.registry.register(task);
        }
        info!(count = self.registry.len(), "auto-generated tasks from agents");
    }

    /// Links tasks by registration order when the process is sequential or
    /// no task declares explicit edges. This is the only automatic context
    /// wiring.
    fn auto_wire_sequential(&mut self) {
        if self.registry.len() < 2 {
            return;
        }
        let explicit_edges = self.registry.iter().any(|t| !t.next_tasks.is_empty());
        if self.process != ProcessKind::Sequential && explicit_edges {
            return;
        }
        let names: Vec<String> = self
            .registry
            .iter()
            .map(|t| t.name.clone().expect("registered tasks are named"))
            .collect();
        for i in 0..names.len() - 1 {
            if let Some(task) = self.registry.get_mut(i) {
                task.next_tasks = vec![names[i + 1].clone()];
            }
            if let Some(next) = self.registry.get_mut(i + 1) {
                next.context.push(ContextItem::Task(names[i].clone()));
            }
        }
        debug!("sequential flow wired with automatic context passing");
    }

    fn build_process(&mut self) -> Result<Box<dyn Process>, RuntimeError> {
        match self.process {
            ProcessKind::Sequential => Ok(Box::new(SequentialProcess::new())),
            ProcessKind::Workflow => Ok(Box::new(
                WorkflowProcess::new(self.max_iter)
                    .with_raw_decision_fallback(self.raw_decision_fallback),
            )),
            ProcessKind::Hierarchical => {
                let llm = self.manager_llm.clone().ok_or_else(|| {
                    RuntimeError::Config("hierarchical process requires a manager LLM".into())
                })?;
                let model = self
                    .manager_model
                    .clone()
                    .unwrap_or_else(default_manager_model);
                let manager = Agent::new(MANAGER_AGENT_NAME, model.clone(), Arc::clone(&llm))
                    .with_role("Project manager")
                    .with_goal("Manage the entire flow of tasks and delegate them to the right agent")
                    .with_backstory("Expert project manager to coordinate tasks among agents");
                self.agents
                    .insert(MANAGER_AGENT_NAME.to_string(), Arc::new(AsyncMutex::new(manager)));
                Ok(Box::new(HierarchicalProcess::new(
                    llm,
                    model,
                    MANAGER_AGENT_NAME,
                    self.agent_order.clone(),
                )))
            }
        }
    }

    /// Retry loop for one task.
    async fn run_task(&mut self, id: usize) -> Result<(), RuntimeError> {
        if self.get_status(id) == Some(TaskStatus::Completed) {
            debug!(id, "task already completed");
            return Ok(());
        }

        let mut retries = 0;
        while self.get_status(id).map(|s| s != TaskStatus::Completed).unwrap_or(false)
            && retries < self.max_retries
        {
            if self.cancelled() {
                if let Some(task) = self.registry.get_mut(id) {
                    task.status = TaskStatus::Failed;
                }
                return Err(RuntimeError::Cancelled);
            }
            debug!(id, attempt = retries + 1, "task attempt");
            match self.get_status(id) {
                Some(TaskStatus::NotStarted) | Some(TaskStatus::InProgress) => {
                    if let Some(output) = self.execute_task(id).await? {
                        let passes = self.completion_passes(id, &output);
                        if passes {
                            self.complete_task(id, output).await;
                            break;
                        }
                    }
                }
                Some(TaskStatus::Failed) => {
                    if let Some(task) = self.registry.get_mut(id) {
                        task.status = TaskStatus::InProgress;
                    }
                }
                _ => break,
            }
            retries += 1;
            if self.get_status(id) != Some(TaskStatus::Completed) && retries < self.max_retries {
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }

        if self.get_status(id) != Some(TaskStatus::Completed) {
            info!(id, retries, "task did not complete within the retry budget");
        }
        Ok(())
    }

    fn completion_passes(&self, id: usize, output: &TaskOutput) -> bool {
        let Some(task) = self.registry.get(id) else { return false };
        if let Some(checker) = &self.completion_checker {
            return checker(task, &output.raw);
        }
        match &task.output {
            OutputSchema::Json(_) => {
                let json_ok = output
                    .json
                    .as_ref()
                    .map(|j| !j.is_null() && j.as_object().map(|o| !o.is_empty()).unwrap_or(true))
                    .unwrap_or(false);
                if json_ok {
                    return true;
                }
            }
            OutputSchema::Typed(_) => {
                if output.typed.is_some() {
                    return true;
                }
            }
            OutputSchema::Raw => {}
        }
        !output.raw.trim().is_empty()
    }

    /// Single execution attempt: prepare, chat, post-process.
    async fn execute_task(&mut self, id: usize) -> Result<Option<TaskOutput>, RuntimeError> {
        let Some(job) = self.prepare_chat(id).await? else {
            return Ok(None);
        };
        let ChatJob { id, agent, agent_name, prompt, opts, timeout } = job;
        let result = run_chat(agent, prompt, opts, timeout).await;
        self.apply_chat_result(id, agent_name, result).await
    }

    /// Preflight for one attempt: status, agent resolution, prompt assembly,
    /// image attachments. `None` means the task was marked failed here.
    async fn prepare_chat(&mut self, id: usize) -> Result<Option<ChatJob>, RuntimeError> {
        let (agent_name, images, tools, output, timeout) = {
            let Some(task) = self.registry.get(id) else {
                error!(id, "task does not exist");
                return Ok(None);
            };
            (
                task.agent.clone(),
                task.images.clone(),
                task.tools.clone(),
                task.output.clone(),
                task.max_execution_time,
            )
        };
        let Some(agent_name) = agent_name else {
            error!(id, "task has no agent assigned");
            self.fail_task(id);
            return Ok(None);
        };
        let Some(agent) = self.agents.get(&agent_name).cloned() else {
            error!(id, agent = %agent_name, "task references an unknown agent");
            self.fail_task(id);
            return Ok(None);
        };

        if let Some(task) = self.registry.get_mut(id) {
            task.status = TaskStatus::InProgress;
        }

        let text = {
            let task = self.registry.get(id).expect("task exists");
            prompt::build_task_prompt(
                task,
                &self.registry,
                self.knowledge.as_ref(),
                self.memory.as_ref(),
                Some(self.user_id.as_str()),
            )
            .await
        };

        let prompt = if images.is_empty() {
            Prompt::Text(text)
        } else {
            match media::build_image_parts(&images).await {
                Ok(image_parts) => {
                    let mut parts = vec![ContentPart::text(text)];
                    parts.extend(image_parts);
                    Prompt::Parts(parts)
                }
                Err(e) => {
                    warn!(id, error = %e, "attachment preparation failed");
                    self.fail_task(id);
                    return Ok(None);
                }
            }
        };

        let opts = ChatOptions {
            tools: if tools.is_empty() { None } else { Some(tools) },
            output,
            cancel: self.cancel.clone(),
            ..Default::default()
        };

        Ok(Some(ChatJob {
            id,
            agent,
            agent_name,
            prompt,
            opts,
            timeout,
        }))
    }

    /// Writes one chat result back into the registry as a [`TaskOutput`].
    async fn apply_chat_result(
        &mut self,
        id: usize,
        agent_name: String,
        result: Result<String, RuntimeError>,
    ) -> Result<Option<TaskOutput>, RuntimeError> {
        let raw = match result {
            Ok(raw) => raw,
            Err(RuntimeError::Cancelled) => {
                self.fail_task(id);
                return Err(RuntimeError::Cancelled);
            }
            Err(e) => {
                warn!(id, agent = %agent_name, error = %e, "task attempt failed");
                self.fail_task(id);
                return Ok(None);
            }
        };

        let Some(task) = self.registry.get_mut(id) else {
            return Ok(None);
        };
        let mut output = TaskOutput::raw_output(&task.description, raw, Some(agent_name));

        match &task.output {
            OutputSchema::Json(_) => {
                let cleaned = clean_json_fences(&output.raw);
                match serde_json::from_str::<Value>(&cleaned) {
                    Ok(value) => {
                        output.json = Some(value);
                        output.output_format = OutputFormat::Json;
                    }
                    Err(e) => {
                        warn!(id, error = %e, "could not parse task output as JSON, keeping raw")
                    }
                }
            }
            OutputSchema::Typed(schema) => {
                let cleaned = clean_json_fences(&output.raw);
                match serde_json::from_str::<Value>(&cleaned) {
                    Ok(value) => match validate_schema(&value, schema) {
                        Ok(()) => {
                            output.typed = Some(value);
                            output.output_format = OutputFormat::Typed;
                        }
                        Err(e) => {
                            warn!(id, error = %e, "task output failed schema validation, keeping raw")
                        }
                    },
                    Err(e) => {
                        warn!(id, error = %e, "could not parse task output as JSON, keeping raw")
                    }
                }
            }
            OutputSchema::Raw => {}
        }

        task.result = Some(output.clone());
        Ok(Some(output))
    }

    fn fail_task(&mut self, id: usize) {
        if let Some(task) = self.registry.get_mut(id) {
            task.status = TaskStatus::Failed;
        }
    }

    /// Completion path: status, output file, memory finalization, callback.
    async fn complete_task(&mut self, id: usize, output: TaskOutput) {
        let (output_file, create_directory, quality_check, expected_output, callback) = {
            let Some(task) = self.registry.get_mut(id) else { return };
            task.status = TaskStatus::Completed;
            (
                task.output_file.clone(),
                task.create_directory,
                task.quality_check,
                task.expected_output.clone(),
                task.callback.clone(),
            )
        };
        debug!(id, "task completed");

        if let Some(path) = output_file {
            if let Err(e) = write_output_file(&path, create_directory, &output).await {
                warn!(id, path = %path.display(), error = %e, "output file write failed");
            }
        }

        if let Some(memory) = &self.memory {
            let agent_name = output.agent.clone().unwrap_or_default();
            let quality_score = if quality_check && memory.has_judge() {
                memory
                    .calculate_quality_metrics(&output.raw, &expected_output)
                    .await
                    .accuracy
            } else {
                0.0
            };
            memory
                .finalize_task_output(&output.raw, &agent_name, quality_score, None)
                .await;
        }

        if let Some(callback) = callback {
            callback(output).await;
        }
    }

    /// Concurrent execution of the workflow start batch. Each task gets one
    /// attempt; the ordinary walk retries failures.
    async fn run_parallel_batch(&mut self, ids: Vec<usize>) -> Result<(), RuntimeError> {
        let mut jobs = Vec::new();
        for id in ids {
            if let Some(job) = self.prepare_chat(id).await? {
                jobs.push(job);
            }
        }

        let results = join_all(jobs.into_iter().map(|job| async move {
            let ChatJob { id, agent, agent_name, prompt, opts, timeout } = job;
            let result = run_chat(agent, prompt, opts, timeout).await;
            (id, agent_name, result)
        }))
        .await;

        for (id, agent_name, result) in results {
            if let Some(output) = self.apply_chat_result(id, agent_name, result).await? {
                if self.completion_passes(id, &output) {
                    self.complete_task(id, output).await;
                }
            }
        }
        Ok(())
    }
}

/// Locks the agent and runs one chat, optionally capped by
/// `max_execution_time`.
async fn run_chat(
    agent: Arc<AsyncMutex<Agent>>,
    prompt: Prompt,
    opts: ChatOptions,
    timeout: Option<Duration>,
) -> Result<String, RuntimeError> {
    let fut = async move { agent.lock().await.chat(prompt, opts).await };
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Llm(format!(
                "task execution exceeded {}s",
                limit.as_secs()
            ))),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use serde_json::json;

    fn orchestrator_with_agent(llm: Arc<MockLlm>) -> Orchestrator {
        let mut orch = Orchestrator::new();
        orch.register_agent(Agent::new("Worker", "mock/model", llm));
        orch
    }

    /// **Scenario**: task ids are registration indices; status and result
    /// accessors read through the orchestrator.
    #[tokio::test]
    async fn register_and_inspect_tasks() {
        let mut orch = orchestrator_with_agent(Arc::new(MockLlm::reply("ok")));
        let a = orch.register_task(Task::new("first", "out").with_agent("Worker"));
        let b = orch.register_task(Task::new("second", "out").with_agent("Worker"));
        assert_eq!((a, b), (0, 1));
        assert_eq!(orch.get_status(0), Some(TaskStatus::NotStarted));
        assert!(orch.get_result(0).is_none());
    }

    /// **Scenario**: a run without agents is a config error.
    #[tokio::test]
    async fn start_without_agents_fails_fast() {
        let mut orch = Orchestrator::new();
        assert!(matches!(
            orch.start(None).await,
            Err(RuntimeError::Config(_))
        ));
    }

    /// **Scenario**: the scratch state map supports set/get/update/clear and
    /// atomic per-key read-modify-write.
    #[test]
    fn state_map_operations() {
        let orch = Orchestrator::new();
        orch.set_state("count", 1);
        assert_eq!(orch.get_state("count"), Some(json!(1)));

        let mut updates = Map::new();
        updates.insert("count".into(), json!(2));
        updates.insert("name".into(), json!("run"));
        orch.update_state(updates);
        assert_eq!(orch.get_state("count"), Some(json!(2)));

        orch.update_state_with("count", |old| {
            json!(old.and_then(Value::as_i64).unwrap_or(0) + 1)
        });
        assert_eq!(orch.get_state("count"), Some(json!(3)));

        orch.clear_state();
        assert_eq!(orch.get_state("count"), None);
    }

    /// **Scenario**: max_retries is floored at 3.
    #[test]
    fn max_retries_floor() {
        let orch = Orchestrator::new().with_max_retries(1);
        assert_eq!(orch.max_retries, 3);
    }

    /// **Scenario**: default completion checking — declared JSON passes on
    /// parsed output, falls back to raw text, and empty raw fails.
    #[tokio::test]
    async fn completion_checker_defaults() {
        let mut orch = orchestrator_with_agent(Arc::new(MockLlm::reply("ok")));
        let id = orch.register_task(
            Task::new("t", "out")
                .with_agent("Worker")
                .with_output_json(json!({"type": "object"})),
        );

        let mut with_json = TaskOutput::raw_output("t", "{\"a\":1}".into(), None);
        with_json.json = Some(json!({"a": 1}));
        assert!(orch.completion_passes(id, &with_json));

        let unparsed = TaskOutput::raw_output("t", "not json but text".into(), None);
        assert!(orch.completion_passes(id, &unparsed));

        let empty = TaskOutput::raw_output("t", "   ".into(), None);
        assert!(!orch.completion_passes(id, &empty));
    }

    /// **Scenario**: hierarchical without a manager LLM fails fast.
    #[tokio::test]
    async fn hierarchical_requires_manager_llm() {
        let mut orch = orchestrator_with_agent(Arc::new(MockLlm::reply("ok")))
            .with_process(ProcessKind::Hierarchical);
        orch.register_task(Task::new("t", "out").with_agent("Worker"));
        assert!(matches!(
            orch.start(None).await,
            Err(RuntimeError::Config(_))
        ));
    }

    /// **Scenario**: a cancelled token stops the run with Cancelled and the
    /// current task failed, not retried.
    #[tokio::test]
    async fn cancellation_stops_run() {
        let token = CancellationToken::new();
        token.cancel();
        let mut orch = orchestrator_with_agent(Arc::new(MockLlm::reply("never")))
            .with_cancellation(token);
        orch.register_task(Task::new("t", "out").with_agent("Worker"));
        assert!(matches!(
            orch.start(None).await,
            Err(RuntimeError::Cancelled)
        ));
    }
}
