//! Task model: declarative units of work plus their outputs and registry.
//!
//! A task names its agent (relations are keyed through the orchestrator's
//! registries, never via back-pointers), declares what to do and what the
//! output should look like, and optionally carries workflow metadata
//! (decision conditions, loop input files, graph edges). `TaskRegistry`
//! assigns insertion-index ids that stay stable for the whole run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

/// Execution status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not started",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Workflow role of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskType {
    /// Ordinary unit of work.
    #[default]
    Task,
    /// Produces a label that selects the next task.
    Decision,
    /// Iterates over seeded items; may fan out from an input file.
    Loop,
}

/// Declared output shape. Exactly one applies per task.
#[derive(Debug, Clone, Default)]
pub enum OutputSchema {
    /// Free text.
    #[default]
    Raw,
    /// JSON object; parsed but not validated.
    Json(Value),
    /// JSON object validated against the schema.
    Typed(Value),
}

impl OutputSchema {
    pub fn is_raw(&self) -> bool {
        matches!(self, OutputSchema::Raw)
    }

    /// Schema value for json/typed declarations.
    pub fn schema(&self) -> Option<&Value> {
        match self {
            OutputSchema::Raw => None,
            OutputSchema::Json(s) | OutputSchema::Typed(s) => Some(s),
        }
    }
}

/// Format of a produced [`TaskOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Raw,
    Json,
    Typed,
}

/// One element of a task's context.
#[derive(Debug, Clone)]
pub enum ContextItem {
    /// Literal string, inlined as input content.
    Text(String),
    /// Literal list, space-joined.
    Items(Vec<String>),
    /// Another task in the same run, referenced by name; its result raw text
    /// is inlined once completed.
    Task(String),
    /// Knowledge-search descriptor; the configured knowledge backend is
    /// queried with the task description.
    Knowledge(Value),
}

/// Async completion hook; receives the produced output.
pub type TaskCallback = Arc<dyn Fn(TaskOutput) -> BoxFuture<'static, ()> + Send + Sync>;

/// Result of one successful task execution.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    /// Copy of the task description.
    pub description: String,
    /// First 10 characters of the description; a debug aid.
    pub summary: String,
    /// Raw agent response. Workflow loop bookkeeping may append
    /// `"\nmore"`/`"\ndone"` to drive condition matching.
    pub raw: String,
    /// Parsed JSON when the task declared a JSON output.
    pub json: Option<Value>,
    /// Schema-validated record when the task declared a typed output.
    pub typed: Option<Value>,
    /// Name of the producing agent.
    pub agent: Option<String>,
    pub output_format: OutputFormat,
}

impl TaskOutput {
    pub fn raw_output(description: &str, raw: String, agent: Option<String>) -> Self {
        Self {
            description: description.to_string(),
            summary: description.chars().take(10).collect(),
            raw,
            json: None,
            typed: None,
            agent,
            output_format: OutputFormat::Raw,
        }
    }

    /// Decision label for workflow routing: typed `decision` field first,
    /// then the parsed JSON one, else `None`.
    pub fn structured_decision(&self) -> Option<String> {
        let field = |v: &Value| v.get("decision").and_then(Value::as_str).map(str::to_string);
        self.typed.as_ref().and_then(&field).or_else(|| self.json.as_ref().and_then(&field))
    }
}

impl std::fmt::Display for TaskOutput {
    /// Raw text for RAW, compact JSON for JSON, pretty JSON for Typed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.output_format, &self.json, &self.typed) {
            (OutputFormat::Json, Some(json), _) => {
                write!(f, "{}", serde_json::to_string(json).unwrap_or_default())
            }
            (OutputFormat::Typed, _, Some(typed)) => {
                write!(f, "{}", serde_json::to_string_pretty(typed).unwrap_or_default())
            }
            _ => write!(f, "{}", self.raw),
        }
    }
}

/// Declarative unit of work.
#[derive(Clone)]
pub struct Task {
    /// Registration index; assigned by the registry, stable for the run.
    pub id: Option<usize>,
    pub name: Option<String>,
    pub description: String,
    pub expected_output: String,
    /// Executing agent, by name. May be absent only under the hierarchical
    /// process, where the manager assigns one.
    pub agent: Option<String>,
    /// Tool-name override; empty means the agent's full registry.
    pub tools: Vec<String>,
    pub context: Vec<ContextItem>,
    pub output: OutputSchema,
    pub output_file: Option<PathBuf>,
    pub create_directory: bool,
    /// Image attachments: local paths or HTTP(S) URLs.
    pub images: Vec<String>,
    pub task_type: TaskType,
    pub is_start: bool,
    /// Workflow-only: execute in the parallel start batch.
    pub async_execution: bool,
    /// Loop seed file (CSV first column, or one line per item).
    pub input_file: Option<PathBuf>,
    /// Decision label → target task names (or the literal `"exit"`).
    /// Insertion-ordered; labels compare case-insensitively.
    pub condition: Vec<(String, Vec<String>)>,
    pub next_tasks: Vec<String>,
    pub previous_tasks: Vec<String>,
    pub status: TaskStatus,
    pub result: Option<TaskOutput>,
    pub callback: Option<TaskCallback>,
    /// Gate for judged memory promotion.
    pub quality_check: bool,
    /// Optional cap around the chat loop.
    pub max_execution_time: Option<Duration>,
    /// Transient workflow context block ("Input data from previous tasks");
    /// written by the workflow engine, appended by the prompt builder. The
    /// stored description is never mutated.
    pub workflow_input: Option<String>,
}

impl Task {
    pub fn new(description: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            description: description.into(),
            expected_output: expected_output.into(),
            agent: None,
            tools: Vec::new(),
            context: Vec::new(),
            output: OutputSchema::Raw,
            output_file: None,
            create_directory: false,
            images: Vec::new(),
            task_type: TaskType::Task,
            is_start: false,
            async_execution: false,
            input_file: None,
            condition: Vec::new(),
            next_tasks: Vec::new(),
            previous_tasks: Vec::new(),
            status: TaskStatus::NotStarted,
            result: None,
            callback: None,
            quality_check: true,
            max_execution_time: None,
            workflow_input: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_context(mut self, item: ContextItem) -> Self {
        self.context.push(item);
        self
    }

    /// Declares a JSON output schema. Replaces any earlier declaration; a
    /// task has exactly one output shape.
    pub fn with_output_json(mut self, schema: Value) -> Self {
        self.output = OutputSchema::Json(schema);
        self
    }

    /// Declares a typed (validated) output schema.
    pub fn with_output_typed(mut self, schema: Value) -> Self {
        self.output = OutputSchema::Typed(schema);
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>, create_directory: bool) -> Self {
        self.output_file = Some(path.into());
        self.create_directory = create_directory;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn start(mut self) -> Self {
        self.is_start = true;
        self
    }

    pub fn with_async_execution(mut self) -> Self {
        self.async_execution = true;
        self
    }

    pub fn with_input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_file = Some(path.into());
        self
    }

    /// Adds one decision branch: `label` → target names (or `"exit"`).
    pub fn on_decision(mut self, label: impl Into<String>, targets: Vec<String>) -> Self {
        self.condition.push((label.into(), targets));
        self
    }

    pub fn with_next_tasks(mut self, names: Vec<String>) -> Self {
        self.next_tasks = names;
        self
    }

    pub fn with_callback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TaskOutput) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.callback = Some(Arc::new(move |out| Box::pin(f(out))));
        self
    }

    pub fn with_quality_check(mut self, enabled: bool) -> Self {
        self.quality_check = enabled;
        self
    }

    pub fn with_max_execution_time(mut self, limit: Duration) -> Self {
        self.max_execution_time = Some(limit);
        self
    }

    /// Name when present, else the description. Used in prompts and logs.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.description)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("agent", &self.agent)
            .field("task_type", &self.task_type)
            .field("status", &self.status)
            .finish()
    }
}

/// Run-scoped task storage; ids are insertion indices.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task, assigning the next id. A task without a name gets
    /// `task_<id>` so name-based edges can always resolve.
    pub fn register(&mut self, mut task: Task) -> usize {
        let id = self.tasks.len();
        task.id = Some(id);
        if task.name.is_none() {
            task.name = Some(format!("task_{}", id));
        }
        self.tasks.push(task);
        id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.name.as_deref() == Some(name))
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        0..self.tasks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut()
    }
}

/// Strips triple-backtick fences from a JSON reply.
///
/// Removes a leading ```` ```json ```` or ```` ``` ```` and a trailing
/// ```` ``` ```` together with surrounding whitespace. Idempotent:
/// `clean(clean(s)) == clean(s)`.
pub fn clean_json_fences(output: &str) -> String {
    let mut cleaned = output.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest.trim_start();
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest.trim_start();
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.trim_end();
    }
    cleaned.to_string()
}

/// Validates a parsed value against a declared typed schema.
///
/// Checks that the value is an object, every `required` property is present,
/// and declared property types match. Nested schemas are not descended into;
/// the typed contract here is shallow by design.
pub fn validate_schema(value: &Value, schema: &Value) -> Result<(), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required property: {}", name));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in properties {
            let Some(actual) = obj.get(name) else { continue };
            let Some(expected) = prop.get("type").and_then(Value::as_str) else { continue };
            let ok = match expected {
                "string" => actual.is_string(),
                "integer" => actual.is_i64() || actual.is_u64(),
                "number" => actual.is_number(),
                "boolean" => actual.is_boolean(),
                "array" => actual.is_array(),
                "object" => actual.is_object(),
                _ => true,
            };
            if !ok {
                return Err(format!("property {} is not of type {}", name, expected));
            }
        }
    }
    Ok(())
}

/// Renders a task output to its file form and writes it.
pub async fn write_output_file(
    path: &Path,
    create_directory: bool,
    output: &TaskOutput,
) -> std::io::Result<()> {
    if create_directory {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, output.to_string()).await
}

/// Reads loop seed items from an input file.
///
/// `.csv`: first column of each non-empty row is one item (surrounding
/// double quotes stripped); other columns are ignored. Any other extension:
/// one trimmed line per item. Both quirks are intentional compatibility
/// behavior — do not "fix" the ignored columns.
pub async fn read_loop_items(path: &Path) -> std::io::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    let items = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            if is_csv {
                let first = line.split(',').next().unwrap_or("").trim();
                first.trim_matches('"').to_string()
            } else {
                line.to_string()
            }
        })
        .filter(|l| !l.is_empty())
        .collect();
    Ok(items)
}

/// Builds the reverse `previous_tasks` edges from every task's `next_tasks`.
pub fn link_previous_tasks(registry: &mut TaskRegistry) {
    let mut previous: HashMap<String, Vec<String>> = HashMap::new();
    for task in registry.iter() {
        let Some(name) = task.name.clone() else { continue };
        for next in &task.next_tasks {
            previous.entry(next.clone()).or_default().push(name.clone());
        }
    }
    for task in registry.iter_mut() {
        if let Some(name) = &task.name {
            if let Some(prev) = previous.remove(name) {
                task.previous_tasks = prev;
            }
        }
    }
}
