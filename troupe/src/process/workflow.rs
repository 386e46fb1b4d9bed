//! Workflow process: a bounded state machine over the task graph.
//!
//! The walk starts at the first `is_start` task (else the first registered),
//! follows decision conditions and `next_tasks` edges, and is bounded by
//! `max_iter`. Loop-type start tasks fan out their input file into one child
//! task per item before the walk begins. Visited tasks are reset to
//! `NotStarted` so branches may revisit them — a deliberate difference from
//! the other processes.
//!
//! Context for a visit is written into `task.workflow_input` (the "Input
//! data from previous tasks" block); the stored description is never
//! mutated, so repeated visits cannot grow it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::task::{
    link_previous_tasks, read_loop_items, Task, TaskRegistry, TaskStatus, TaskType,
};

use super::Process;

/// Per-loop-task bookkeeping.
#[derive(Debug, Clone)]
struct LoopState {
    items: Vec<String>,
    index: usize,
    remaining: usize,
}

/// Graph walk with decisions and loops.
pub struct WorkflowProcess {
    max_iter: u32,
    iter: u32,
    started: bool,
    current: Option<usize>,
    visited: HashSet<usize>,
    loop_states: HashMap<String, LoopState>,
    /// Compatibility fallback: when a decision/loop result has no structured
    /// `decision` field, match condition labels as substrings of the raw
    /// text. This is what routes the `\nmore`/`\ndone` loop suffixes.
    raw_decision_fallback: bool,
}

impl WorkflowProcess {
    pub fn new(max_iter: u32) -> Self {
        Self {
            max_iter,
            iter: 0,
            started: false,
            current: None,
            visited: HashSet::new(),
            loop_states: HashMap::new(),
            raw_decision_fallback: true,
        }
    }

    /// Disables raw-text decision matching; only structured `decision`
    /// fields route then.
    pub fn with_raw_decision_fallback(mut self, enabled: bool) -> Self {
        self.raw_decision_fallback = enabled;
        self
    }

    /// Builds reverse edges, picks the start task, and fans out a loop-type
    /// start task's input file into chained child tasks.
    async fn prepare(&mut self, registry: &mut TaskRegistry) -> Result<(), RuntimeError> {
        link_previous_tasks(registry);

        let Some(mut start) = registry
            .iter()
            .position(|t| t.is_start)
            .or_else(|| if registry.is_empty() { None } else { Some(0) })
        else {
            return Ok(());
        };

        let is_loop_start = registry
            .get(start)
            .map(|t| t.task_type == TaskType::Loop)
            .unwrap_or(false);
        if is_loop_start {
            {
                let task = registry.get_mut(start).expect("start task exists");
                if task.input_file.is_none() {
                    task.input_file = Some(PathBuf::from("tasks.csv"));
                }
            }
            let start_task = registry.get(start).expect("start task exists");
            let input_file = start_task.input_file.clone().expect("input file defaulted");
            match read_loop_items(&input_file).await {
                Ok(items) if !items.is_empty() => {
                    start = self.materialize_loop_items(registry, start, items);
                }
                Ok(_) => {}
                Err(e) => {
                    // The walk continues from the loop task itself.
                    warn!(file = %input_file.display(), error = %e, "failed to read loop input file");
                }
            }
        }

        self.current = Some(start);
        Ok(())
    }

    /// One child task per item, chained `complete → next` / `retry →
    /// current`; the first child becomes the new start.
    fn materialize_loop_items(
        &mut self,
        registry: &mut TaskRegistry,
        loop_id: usize,
        items: Vec<String>,
    ) -> usize {
        let (agent, expected_output, input_file) = {
            let loop_task = registry.get(loop_id).expect("loop task exists");
            (
                loop_task.agent.clone(),
                loop_task.expected_output.clone(),
                loop_task.input_file.clone(),
            )
        };

        let mut first_child = None;
        let mut previous: Option<usize> = None;
        for (i, item) in items.iter().enumerate() {
            let mut child = Task::new(item.clone(), expected_output.clone())
                .with_name(item.clone())
                .on_decision("complete", vec!["next".into()])
                .on_decision("retry", vec!["current".into()]);
            child.agent = agent.clone();
            child.is_start = i == 0;
            let child_id = registry.register(child);
            if first_child.is_none() {
                first_child = Some(child_id);
            }
            if let Some(prev_id) = previous {
                let name = registry
                    .get(child_id)
                    .and_then(|t| t.name.clone())
                    .expect("child task named");
                let prev = registry.get_mut(prev_id).expect("previous child exists");
                prev.next_tasks = vec![name.clone()];
                for (label, targets) in prev.condition.iter_mut() {
                    if label == "complete" {
                        *targets = vec![name.clone()];
                    }
                }
            }
            previous = Some(child_id);
        }

        if let Some(file) = input_file {
            info!(count = items.len(), file = %file.display(), "created tasks from loop input file");
        }
        first_child.unwrap_or(loop_id)
    }

    /// Renders the "Input data from previous tasks" block for one visit.
    fn build_workflow_input(task: &Task, registry: &TaskRegistry) -> Option<String> {
        if task.previous_tasks.is_empty() && task.context.is_empty() {
            return None;
        }
        let mut block = String::from("\nInput data from previous tasks:");
        for prev_name in &task.previous_tasks {
            if let Some(prev) = registry.find_by_name(prev_name).and_then(|id| registry.get(id)) {
                if let Some(result) = &prev.result {
                    block.push_str(&format!("\n{}: {}", prev_name, result.raw));
                }
            }
        }
        for item in &task.context {
            if let crate::task::ContextItem::Task(name) = item {
                if Some(name.as_str()) == task.name.as_deref() {
                    continue;
                }
                if let Some(ctx) = registry.find_by_name(name).and_then(|id| registry.get(id)) {
                    if let Some(result) = &ctx.result {
                        block.push_str(&format!("\n{}: {}", name, result.raw));
                    }
                }
            }
        }
        Some(block)
    }

    /// Seeds a mid-workflow loop task's items from its previous task's
    /// result, one item per non-empty line, on first visit.
    fn seed_loop_state(&mut self, id: usize, registry: &TaskRegistry) {
        let Some(task) = registry.get(id) else { return };
        if task.task_type != TaskType::Loop {
            return;
        }
        let Some(name) = task.name.clone() else { return };
        if self.loop_states.contains_key(&name) {
            return;
        }
        let items: Vec<String> = task
            .previous_tasks
            .iter()
            .filter_map(|prev| registry.find_by_name(prev).and_then(|pid| registry.get(pid)))
            .filter_map(|prev| prev.result.as_ref())
            .flat_map(|result| result.raw.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if !items.is_empty() {
            debug!(task = %name, count = items.len(), "seeded loop items");
            let remaining = items.len();
            self.loop_states.insert(
                name,
                LoopState {
                    items,
                    index: 0,
                    remaining,
                },
            );
        }
    }

    /// Resolves the decision label for a finished decision/loop task.
    fn decision_target(&self, task: &Task) -> Decision {
        let Some(result) = &task.result else {
            return Decision::NoMatch;
        };
        let structured = result.structured_decision().map(|d| d.to_lowercase());
        let raw = result.raw.to_lowercase();

        for (label, targets) in &task.condition {
            let label = label.to_lowercase();
            let matched = match &structured {
                Some(decision) => *decision == label,
                None => self.raw_decision_fallback && raw.contains(&label),
            };
            if !matched {
                continue;
            }
            let target = targets.first().cloned().unwrap_or_default();
            if target.is_empty() || target == "exit" {
                return Decision::Exit;
            }
            return Decision::Target(target);
        }
        Decision::NoMatch
    }
}

enum Decision {
    Exit,
    Target(String),
    NoMatch,
}

#[async_trait]
impl Process for WorkflowProcess {
    async fn next_task(
        &mut self,
        registry: &mut TaskRegistry,
    ) -> Result<Option<usize>, RuntimeError> {
        if !self.started {
            self.started = true;
            self.prepare(registry).await?;
        }
        let Some(id) = self.current else {
            return Ok(None);
        };
        self.iter += 1;
        if self.iter > self.max_iter {
            info!(max_iter = self.max_iter, "max iteration limit reached, ending workflow");
            self.current = None;
            return Ok(None);
        }

        self.seed_loop_state(id, registry);

        let workflow_input = registry
            .get(id)
            .and_then(|task| Self::build_workflow_input(task, registry));
        if let Some(task) = registry.get_mut(id) {
            task.workflow_input = workflow_input;
            debug!(task = %task.display_name(), id, "executing workflow task");
        }
        Ok(Some(id))
    }

    fn observe(&mut self, id: usize, registry: &mut TaskRegistry) {
        self.visited.insert(id);

        // Workflow tasks may be revisited: completed resets to not-started.
        let (task_type, name) = {
            let Some(task) = registry.get_mut(id) else { return };
            if task.status == TaskStatus::Completed {
                debug!(id, "resetting completed workflow task for possible revisit");
                task.status = TaskStatus::NotStarted;
            }
            (task.task_type, task.name.clone())
        };

        // Loop bookkeeping: advance and suffix the result so conditions match.
        if task_type == TaskType::Loop {
            if let Some(state) = name.as_ref().and_then(|n| self.loop_states.get_mut(n)) {
                state.index = (state.index + 1).min(state.items.len());
                state.remaining = state.remaining.saturating_sub(1);
                let has_more = state.remaining > 0;
                if let Some(result) = registry.get_mut(id).and_then(|t| t.result.as_mut()) {
                    result.raw.push_str(if has_more { "\nmore" } else { "\ndone" });
                }
            }
        }

        let next = {
            let Some(task) = registry.get(id) else { return };
            let mut next: Option<usize> = None;
            if matches!(task.task_type, TaskType::Decision | TaskType::Loop) {
                match self.decision_target(task) {
                    Decision::Exit => {
                        info!("workflow exit condition met, ending workflow");
                        self.current = None;
                        return;
                    }
                    Decision::Target(target) => {
                        next = registry.find_by_name(&target);
                        if next.is_none() {
                            warn!(target = %target, "decision target not found");
                        }
                    }
                    Decision::NoMatch => {}
                }
            }
            if next.is_none() {
                if let Some(first_next) = task.next_tasks.first() {
                    next = registry.find_by_name(first_next);
                }
            }
            next
        };

        // A self-target clears the visited mark so the task re-executes.
        if next == Some(id) {
            self.visited.remove(&id);
        }
        if next.is_none() {
            info!("workflow execution completed");
        }
        self.current = next;
    }
}
