//! Sequential process: registration order, skipping completed tasks.

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::task::{TaskRegistry, TaskStatus};

use super::Process;

/// Yields task ids in registration order; already-completed tasks are
/// skipped.
#[derive(Debug, Default)]
pub struct SequentialProcess {
    cursor: usize,
}

impl SequentialProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Process for SequentialProcess {
    async fn next_task(
        &mut self,
        registry: &mut TaskRegistry,
    ) -> Result<Option<usize>, RuntimeError> {
        while self.cursor < registry.len() {
            let id = self.cursor;
            self.cursor += 1;
            let completed = registry
                .get(id)
                .map(|t| t.status == TaskStatus::Completed)
                .unwrap_or(true);
            if !completed {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}
