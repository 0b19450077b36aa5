//! Tool System
//!
//! Capability framework for the agent. Capabilities are registered once when
//! the engine is built and invoked by the dispatcher with a uniform
//! `(args) -> result` contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool arguments as a JSON object
pub type ToolArgs = Map<String, Value>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default, alias = "arguments")]
    pub args: ToolArgs,

    /// Optional call ID for tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            name: name.into(),
            args,
            id: None,
        }
    }

    /// Build from a JSON object literal; non-object values yield empty args
    pub fn from_json(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, args)
    }
}

/// Logical resource group a capability belongs to
///
/// Calls in different groups may run in parallel. Calls inside a contended
/// group share one expensive backend and run one after another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    Knowledge,
    Image,
    Risk,
    Dossier,
    Medication,
    Other,
}

impl ToolGroup {
    /// Whether calls in this group must not overlap
    pub fn is_contended(self) -> bool {
        matches!(self, ToolGroup::Knowledge | ToolGroup::Image)
    }
}

impl std::fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolGroup::Knowledge => "knowledge",
            ToolGroup::Image => "image",
            ToolGroup::Risk => "risk",
            ToolGroup::Dossier => "dossier",
            ToolGroup::Medication => "medication",
            ToolGroup::Other => "other",
        };
        f.write_str(name)
    }
}

/// Result from tool execution
///
/// Immutable once produced by the dispatcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Tool that was called
    pub tool: String,

    /// Arguments the tool was called with
    pub args: ToolArgs,

    /// Returned data (`null` on failure)
    pub result: Value,

    /// Whether execution succeeded
    pub success: bool,

    /// Wall-clock duration of the call
    pub duration_ms: u64,

    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Group the call was scheduled in
    pub group: ToolGroup,
}

impl ToolResult {
    pub fn success(call: &ToolCall, group: ToolGroup, result: Value, duration_ms: u64) -> Self {
        Self {
            tool: call.name.clone(),
            args: call.args.clone(),
            result,
            success: true,
            duration_ms,
            error: None,
            group,
        }
    }

    pub fn failure(
        call: &ToolCall,
        group: ToolGroup,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            tool: call.name.clone(),
            args: call.args.clone(),
            result: Value::Null,
            success: false,
            duration_ms,
            error: Some(error.into()),
            group,
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Resource group used for scheduling
    pub group: ToolGroup,
}

impl ToolSchema {
    /// JSON Schema object for native function-calling providers
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(param.param_type.clone()));
            prop.insert("description".into(), Value::String(param.description.clone()));
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), Value::Array(values.clone()));
            }
            if param.param_type == "array" {
                prop.insert("items".into(), serde_json::json!({"type": "string"}));
            }
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }
}

/// Tool trait - implement to add new capabilities
///
/// Capabilities return data only. Writing results into session state is the
/// controller's job.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, args: &ToolArgs) -> Result<Value>;

    /// Validate arguments before execution (optional)
    fn validate(&self, args: &ToolArgs) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !args.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry for available tools
///
/// Built once at startup and shared read-only afterwards.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up a tool, rejecting unknown names
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Group of a registered tool; unknown names fall into `Other`
    pub fn group_of(&self, name: &str) -> ToolGroup {
        self.tools
            .get(name)
            .map_or(ToolGroup::Other, |t| t.schema().group)
    }

    /// Get all tool schemas, ordered by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str("To call one or more tools, respond with one JSON block per call:\n\n");
        prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");

        for schema in self.schemas() {
            prompt.push_str(&format!("### {}\n", schema.name));
            prompt.push_str(&format!("{}\n", schema.description));

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    let default = param
                        .default
                        .as_ref()
                        .map(|d| format!(" (default {d})"))
                        .unwrap_or_default();
                    prompt.push_str(&format!(
                        "- `{}` ({}){}{}: {}\n",
                        param.name, param.param_type, required, default, param.description
                    ));
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Non-empty trimmed string argument
pub fn string_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// List argument given either as a JSON array or a comma-separated string
pub fn string_list_arg(args: &ToolArgs, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Unsigned integer argument, accepting numeric strings
pub fn u64_arg(args: &ToolArgs, key: &str) -> Option<u64> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the input".into(),
                parameters: vec![ParameterSchema::required("text", "string", "Text to echo")],
                group: ToolGroup::Other,
            }
        }

        async fn execute(&self, args: &ToolArgs) -> Result<Value> {
            Ok(json!({ "text": string_arg(args, "text") }))
        }
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(matches!(registry.resolve("unknown"), Err(AgentError::ToolNotFound(_))));
        assert_eq!(registry.group_of("unknown"), ToolGroup::Other);
    }

    #[test]
    fn test_validate_missing_required() {
        let err = EchoTool.validate(&ToolArgs::new()).unwrap_err();
        assert!(err.to_string().contains("text"));
    }

    #[test]
    fn test_tool_call_accepts_text_protocol_keys() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "echo", "arguments": {"text": "hi"}}"#).unwrap();
        assert_eq!(call.name, "echo");
        assert_eq!(call.args.get("text"), Some(&json!("hi")));
    }

    #[test]
    fn test_list_arg_forms() {
        let args = json!({"a": ["x", " y "], "b": "p, q,,r"});
        let args = args.as_object().unwrap();
        assert_eq!(string_list_arg(args, "a"), vec!["x", "y"]);
        assert_eq!(string_list_arg(args, "b"), vec!["p", "q", "r"]);
        assert!(string_list_arg(args, "c").is_empty());
    }

    #[test]
    fn test_json_schema_lists_required() {
        let schema = EchoTool.schema().to_json_schema();
        assert_eq!(schema["parameters"]["required"], json!(["text"]));
    }

    #[test]
    fn test_defaults_advertised() {
        let schema = ToolSchema {
            name: "lookup".into(),
            description: "Look something up".into(),
            parameters: vec![ParameterSchema::optional("severity", "string", "How bad").with_default(json!("moderate"))],
            group: ToolGroup::Other,
        };
        assert_eq!(schema.to_json_schema()["parameters"]["properties"]["severity"]["default"], "moderate");

        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(!registry.generate_prompt_section().contains("default"));
    }
}
