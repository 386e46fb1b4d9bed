//! Tool abstraction: a named callable taking a JSON object and returning a
//! JSON value.
//!
//! Agents depend on [`Tool`] plus [`ToolRegistry`] instead of concrete tool
//! implementations. A tool declares its argument schema through the
//! [`Parameters`] builder; the resulting JSON schema is what the LLM sees,
//! and arguments are filtered to the declared parameter names before the
//! call, so extra keys the model invents are dropped rather than passed on.

mod registry;

pub use registry::ToolRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from resolving or executing tools.
///
/// Never fatal to an agent: the loop reports them back to the model as
/// `{"error": "<msg>"}` tool results and lets it recover.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution: {0}")]
    Execution(String),
}

/// Tool specification handed to the LLM as a function schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name, unique within one agent's registry.
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: Option<String>,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    /// Keeps only the keys of `args` that are declared in the schema's
    /// `properties`. Non-object arguments pass through unchanged.
    pub fn filter_arguments(&self, args: Value) -> Value {
        let properties = match self.parameters.get("properties").and_then(Value::as_object) {
            Some(p) => p,
            None => return args,
        };
        match args {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| properties.contains_key(k))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Argument types supported by the schema builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
struct Param {
    name: String,
    ty: ParamType,
    description: Option<String>,
    required: bool,
}

/// Declared argument schema for one tool.
///
/// Parameters without a default are required; the produced schema's
/// `required` list equals exactly those names.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    params: Vec<Param>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required parameter.
    pub fn required(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            description: Some(description.into()),
            required: true,
        });
        self
    }

    /// Adds an optional parameter (one that has a default on the tool side).
    pub fn optional(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            description: Some(description.into()),
            required: false,
        });
        self
    }

    /// Renders the JSON-schema `object` the chat API expects.
    pub fn schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), Value::String(p.ty.as_str().into()));
            if let Some(d) = &p.description {
                prop.insert("description".into(), Value::String(d.clone()));
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A named callable: JSON object in, JSON value out.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model.
    fn name(&self) -> &str;

    /// One-line description for the model.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Declared argument schema.
    fn parameters(&self) -> Parameters;

    /// Executes the tool with an arguments object.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;

    /// Full spec (name + description + schema) for the chat API.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            parameters: self.parameters().schema(),
        }
    }
}

type ToolFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// Adapter turning an async closure into a [`Tool`].
///
/// ```rust
/// use troupe::tools::{FnTool, Parameters, ParamType};
/// use serde_json::json;
///
/// let add = FnTool::new(
///     "add",
///     "Adds two ints",
///     Parameters::new()
///         .required("a", ParamType::Integer, "first addend")
///         .required("b", ParamType::Integer, "second addend"),
///     |args| async move {
///         let a = args["a"].as_i64().unwrap_or(0);
///         let b = args["b"].as_i64().unwrap_or(0);
///         Ok(json!(a + b))
///     },
/// );
/// assert_eq!(add.name(), "add");
/// # use troupe::tools::Tool;
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: Option<String>,
    parameters: Parameters,
    f: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Parameters,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
            f: Arc::new(move |args| Box::pin(f(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn parameters(&self) -> Parameters {
        self.parameters.clone()
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        (self.f)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_tool() -> FnTool {
        FnTool::new(
            "add",
            "Adds two ints",
            Parameters::new()
                .required("a", ParamType::Integer, "first addend")
                .required("b", ParamType::Integer, "second addend"),
            |args| async move {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                Ok(json!(a + b))
            },
        )
    }

    /// **Scenario**: a schema with N required parameters lists exactly those
    /// names in `required`.
    #[test]
    fn parameters_schema_required_set_matches_declared_names() {
        let schema = Parameters::new()
            .required("a", ParamType::Integer, "first")
            .required("b", ParamType::Integer, "second")
            .optional("precision", ParamType::Number, "rounding")
            .schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "integer");
        assert_eq!(schema["properties"]["precision"]["description"], "rounding");
        let required: std::collections::HashSet<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, ["a", "b"].into_iter().collect());
    }

    /// **Scenario**: arguments not in the signature are dropped before the call.
    #[test]
    fn filter_arguments_drops_undeclared_keys() {
        let spec = add_tool().spec();
        let filtered = spec.filter_arguments(json!({"a": 2, "b": 3, "verbose": true}));
        assert_eq!(filtered, json!({"a": 2, "b": 3}));
    }

    /// **Scenario**: FnTool executes and returns a JSON value.
    #[tokio::test]
    async fn fn_tool_call_returns_json() {
        let tool = add_tool();
        let out = tool.call(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(out, json!(5));
    }
}
