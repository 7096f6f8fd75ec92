//! Manager module payloads: tool definitions and goal execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::base::{comma_list, object_or_empty, ModuleMessage, ModuleRequest, ModuleResponse};

// ---------------------------------------------------------------------------
// ToolDefinition / ToolRegistry
// ---------------------------------------------------------------------------

/// A callable tool exposed over HTTP by some module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolDefinition {
    pub name: String,
    pub method: String,
    pub path: String,
    /// Query parameter names; accepts a comma-separated string on input.
    #[serde(deserialize_with = "comma_list")]
    pub params: Vec<String>,
    pub desc: String,
}

impl Default for ToolDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            method: "GET".to_string(),
            path: String::new(),
            params: Vec::new(),
            desc: String::new(),
        }
    }
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        let mut tool = Self {
            name: name.into(),
            method: method.into(),
            path: path.into(),
            ..Self::default()
        };
        tool.normalize();
        tool
    }

    #[must_use]
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self.normalize();
        self
    }
}

impl ModuleMessage for ToolDefinition {
    fn normalize(&mut self) {
        let method = self.method.trim();
        self.method = if method.is_empty() {
            "GET".to_string()
        } else {
            method.to_ascii_uppercase()
        };
        self.params.retain(|param| !param.is_empty());
    }
}

impl ModuleResponse for ToolDefinition {}

/// Collection of registered tools, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRegistry {
    pub tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn from_tools(tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        Self {
            tools: tools.into_iter().collect(),
        }
    }

    /// Replaces any tool with the same name and appends `tool` at the end.
    pub fn upsert(&mut self, tool: ToolDefinition) {
        self.tools.retain(|existing| existing.name != tool.name);
        self.tools.push(tool);
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }
}

impl ModuleMessage for ToolRegistry {
    fn normalize(&mut self) {
        for tool in &mut self.tools {
            tool.normalize();
        }
    }
}

impl ModuleResponse for ToolRegistry {}

// ---------------------------------------------------------------------------
// Run request / result
// ---------------------------------------------------------------------------

/// Body of the manager's `run` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerRunRequest {
    pub goal: String,
    #[serde(deserialize_with = "object_or_empty")]
    pub inputs: Map<String, Value>,
    #[serde(deserialize_with = "object_or_empty")]
    pub metadata: Map<String, Value>,
}

impl ModuleMessage for ManagerRunRequest {
    fn normalize(&mut self) {
        let trimmed = self.goal.trim();
        if trimmed.len() != self.goal.len() {
            self.goal = trimmed.to_string();
        }
    }
}

impl ModuleRequest for ManagerRunRequest {}

/// Structured outcome of a manager run. Exactly one of `result` or `error` is
/// normally set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerRunResult {
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub query: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_tools: Option<ToolRegistry>,
}

impl ManagerRunResult {
    /// Attaches the tool registry known at the time of the run.
    #[must_use]
    pub fn with_known_tools(mut self, registry: ToolRegistry) -> Self {
        self.known_tools = Some(registry);
        self
    }
}

impl ModuleMessage for ManagerRunResult {}

impl ModuleResponse for ManagerRunResult {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_params_accept_comma_string() {
        let tool = ToolDefinition::from_payload(json!({
            "name": "text.uppercase",
            "method": "get",
            "path": "/v1/text/uppercase",
            "params": "s, ,limit",
        }));
        assert_eq!(tool.method, "GET");
        assert_eq!(tool.params, vec!["s", "limit"]);
    }

    #[test]
    fn tool_method_defaults_to_get() {
        let tool = ToolDefinition::from_payload(json!({"name": "a", "path": "/a", "method": ""}));
        assert_eq!(tool.method, "GET");
        assert!(tool.params.is_empty());
    }

    #[test]
    fn registry_upsert_replaces_by_name() {
        let mut registry = ToolRegistry::from_tools([
            ToolDefinition::new("a", "GET", "/a"),
            ToolDefinition::new("b", "GET", "/b"),
        ]);
        registry.upsert(ToolDefinition::new("a", "post", "/a2"));
        assert_eq!(registry.names(), vec!["b", "a"]);
        let replaced = registry.find("a").unwrap();
        assert_eq!(replaced.method, "POST");
        assert_eq!(replaced.path, "/a2");
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn run_request_discards_non_object_inputs() {
        let request = ManagerRunRequest::from_payload(json!({
            "goal": "  uppercase hello  ",
            "inputs": "nope",
            "metadata": null,
        }));
        assert_eq!(request.goal, "uppercase hello");
        assert!(request.inputs.is_empty());
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn run_result_payload_omits_unset_fields() {
        let result = ManagerRunResult {
            goal: "x".to_string(),
            error: Some("no_tool".to_string()),
            ..ManagerRunResult::default()
        }
        .with_known_tools(ToolRegistry::default());
        let payload = Value::Object(result.to_payload());
        assert_eq!(
            payload,
            json!({"goal": "x", "query": {}, "error": "no_tool", "known_tools": {"tools": []}})
        );
    }
}
