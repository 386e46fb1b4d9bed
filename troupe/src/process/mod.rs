//! Process engine: three execution strategies over the task registry.
//!
//! A process is an ordered lazy sequence of task ids; the orchestrator
//! drives it — `next_task` picks the next id (mutating the registry where
//! the strategy requires it, e.g. loop fan-out), the orchestrator executes
//! the task with retries, then `observe` lets the process react to the
//! result (decision branching, completion counting).
//!
//! Strategies: [`SequentialProcess`] (registration order),
//! [`WorkflowProcess`] (graph with decisions and loops), and
//! [`HierarchicalProcess`] (a manager agent dispatches).

mod hierarchical;
mod sequential;
mod workflow;

pub use hierarchical::HierarchicalProcess;
pub use sequential::SequentialProcess;
pub use workflow::WorkflowProcess;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::task::TaskRegistry;

/// Strategy selector for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessKind {
    #[default]
    Sequential,
    Workflow,
    Hierarchical,
}

impl std::str::FromStr for ProcessKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(ProcessKind::Sequential),
            "workflow" => Ok(ProcessKind::Workflow),
            "hierarchical" => Ok(ProcessKind::Hierarchical),
            other => Err(RuntimeError::Config(format!("unknown process: {}", other))),
        }
    }
}

/// One execution strategy.
///
/// A process leaves the run consistent on any exit: executed tasks keep
/// their last status and result. Unhandled task errors are the
/// orchestrator's retry concern, not the process's.
#[async_trait]
pub trait Process: Send {
    /// Picks the next task to execute, or `None` to end the run.
    async fn next_task(&mut self, registry: &mut TaskRegistry)
        -> Result<Option<usize>, RuntimeError>;

    /// Observes a finished execution attempt for task `id`.
    fn observe(&mut self, _id: usize, _registry: &mut TaskRegistry) {}
}
