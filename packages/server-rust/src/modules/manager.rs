//! Minimal goal runner: plan, select a registered tool, call it over HTTP.

use std::sync::Arc;
use std::time::Duration;

use coman_core::messages::{ManagerRunRequest, ManagerRunResult, ToolDefinition, ToolRegistry};
use coman_core::{BoundArguments, ModuleMessage, ParamType, ParameterSpec};
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::store::JsonStore;
use crate::module::{EndpointSpec, Handler, HandlerError, HandlerResult, Module, ModuleBase, ModuleDescriptor};
use crate::registry::{Core, ModulePackage};

const TOOL_TIMEOUT: Duration = Duration::from_secs(20);
const URL_TOOL: &str = "webscraper.title";

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Tool choice for a goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub tool: Option<&'static str>,
    pub url: Option<String>,
}

/// Keyword heuristics mapping a goal to a tool name.
///
/// A URL in the goal always selects the web scraper; otherwise the first
/// matching heuristic wins.
#[derive(Debug)]
pub struct Planner {
    url: Regex,
    heuristics: Vec<(Regex, &'static str)>,
}

impl Planner {
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            url: Regex::new(r#"(?i)(https?://[^\s\])},;"]+)"#)?,
            heuristics: vec![
                (Regex::new(r"(?i)\btitle\b|\burl\b")?, URL_TOOL),
                (Regex::new(r"(?i)\bupper(case)?\b")?, "text.uppercase"),
                (Regex::new(r"(?i)\b(cpu|memory|ram)\b")?, "resources.snapshot"),
            ],
        })
    }

    #[must_use]
    pub fn plan(&self, goal: &str) -> Plan {
        if let Some(found) = self.url.captures(goal).and_then(|c| c.get(1)) {
            return Plan {
                tool: Some(URL_TOOL),
                url: Some(found.as_str().to_string()),
            };
        }
        let tool = self
            .heuristics
            .iter()
            .find(|(pattern, _)| pattern.is_match(goal))
            .map(|(_, tool)| *tool);
        Plan { tool, url: None }
    }
}

// ---------------------------------------------------------------------------
// Module state
// ---------------------------------------------------------------------------

struct Manager {
    tools: JsonStore<ToolRegistry>,
    planner: Planner,
    client: reqwest::Client,
    api_base: String,
}

impl Manager {
    fn list_tools(&self) -> HandlerResult {
        Ok(serde_json::to_value(self.tools.load()?).map_err(anyhow::Error::from)?)
    }

    fn register_tool(&self, args: &BoundArguments) -> HandlerResult {
        let tool = ToolDefinition::from_payload(json!({
            "name": args.parse::<String>("name")?,
            "method": args.parse::<String>("method")?,
            "path": args.parse::<String>("path")?,
            "params": args.parse::<String>("params")?,
            "desc": args.parse::<String>("desc")?,
        }));
        info!(tool = %tool.name, path = %tool.path, "tool registered");
        self.tools.update(|registry| registry.upsert(tool))?;
        Ok(json!({"ok": true}))
    }

    async fn run(&self, args: BoundArguments) -> HandlerResult {
        let request =
            ManagerRunRequest::from_payload(args.get("payload").cloned().unwrap_or(Value::Null));
        let goal = if request.goal.is_empty() {
            args.str("goal_q").unwrap_or_default().to_string()
        } else {
            request.goal.clone()
        };

        let plan = self.planner.plan(&goal);
        let Some(tool_name) = plan.tool else {
            let result = ManagerRunResult {
                goal,
                error: Some("no_tool".to_string()),
                message: Some("No matching tool found".to_string()),
                ..ManagerRunResult::default()
            }
            .with_known_tools(self.tools.load()?);
            return Ok(Value::Object(result.to_payload()));
        };

        let registry = self.tools.load()?;
        let Some(tool) = registry.find(tool_name) else {
            return Ok(json!({"error": "unknown_tool", "name": tool_name}));
        };

        let query = build_query(tool, &request.inputs, &goal, plan.url.as_deref());
        debug!(tool = tool_name, method = %tool.method, path = %tool.path, "calling tool");
        let body = self.call_tool(tool, &query).await?;

        let result = ManagerRunResult {
            goal,
            tool: Some(tool_name.to_string()),
            query,
            result: Some(normalize_response(&body)),
            ..ManagerRunResult::default()
        };
        Ok(Value::Object(result.to_payload()))
    }

    async fn call_tool(&self, tool: &ToolDefinition, query: &Map<String, Value>) -> Result<String, HandlerError> {
        let url = format!("{}{}", self.api_base, tool.path);
        let pairs: Vec<(&str, String)> = query
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.as_str(), text)
            })
            .collect();

        let request = if tool.method == "GET" {
            self.client.get(&url).query(&pairs)
        } else {
            self.client.post(&url).query(&pairs).json(&json!({}))
        };
        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::Unavailable(format!("tool '{}' call failed: {e}", tool.name)))?;
        response
            .text()
            .await
            .map_err(|e| HandlerError::Unavailable(format!("tool '{}' response unreadable: {e}", tool.name)))
    }
}

/// Fills each declared tool parameter from the run inputs, the goal (`s`)
/// or the URL found in the goal (`url`).
fn build_query(
    tool: &ToolDefinition,
    inputs: &Map<String, Value>,
    goal: &str,
    url: Option<&str>,
) -> Map<String, Value> {
    let mut query = Map::new();
    for param in &tool.params {
        if let Some(value) = inputs.get(param) {
            query.insert(param.clone(), value.clone());
        } else if param == "s" {
            query.insert(param.clone(), Value::String(goal.to_string()));
        } else if let (Some(url), "url") = (url, param.as_str()) {
            query.insert(param.clone(), Value::String(url.to_string()));
        }
    }
    query
}

/// Decodes a tool response body into a JSON object where possible: JSON is
/// decoded, JSON-looking strings are decoded again, and remaining text is
/// wrapped as `{"text": ...}`.
fn normalize_response(body: &str) -> Value {
    let mut value = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
    if let Value::String(text) = &value {
        let trimmed = text.trim();
        let looks_structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
            || (trimmed.starts_with('[') && trimmed.ends_with(']'));
        if looks_structured {
            if let Ok(decoded) = serde_json::from_str(trimmed) {
                value = decoded;
            }
        }
    }
    match value {
        Value::String(text) => json!({"text": text}),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns an error if the HTTP client or the planner cannot be built.
pub fn build(core: &Core) -> anyhow::Result<Arc<dyn Module>> {
    let settings = core.settings();
    let manager = Arc::new(Manager {
        tools: JsonStore::new(settings.data_file("tools.json")),
        planner: Planner::new()?,
        // Console calls run on a per-call runtime, so no connection may be
        // pooled across calls.
        client: reqwest::Client::builder()
            .timeout(TOOL_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()?,
        api_base: settings.api_base.clone(),
    });

    let mut base = ModuleBase::new(ModuleDescriptor::new(
        "manager",
        "Minimal AI manager: plan, select tool, execute",
    ));

    let state = Arc::clone(&manager);
    base.register(
        EndpointSpec::get("/tools", Handler::sync(move |_| state.list_tools()))
            .name("tools")
            .summary("List registered tools"),
    );

    let state = Arc::clone(&manager);
    base.register(
        EndpointSpec::post("/tools/register", Handler::sync(move |args| state.register_tool(&args)))
            .name("register_tool")
            .summary("Register or replace a tool")
            .param(ParameterSpec::required("name", ParamType::String))
            .param(ParameterSpec::required("method", ParamType::String))
            .param(ParameterSpec::required("path", ParamType::String))
            .param(ParameterSpec::with_default("params", ParamType::String, ""))
            .param(ParameterSpec::with_default("desc", ParamType::String, "")),
    );

    let state = Arc::clone(&manager);
    base.register(
        EndpointSpec::post(
            "/run",
            Handler::from_async(move |args| {
                let state = Arc::clone(&state);
                async move { state.run(args).await }
            }),
        )
        .name("run")
        .summary("Run a goal through the best matching tool")
        .param(ParameterSpec::optional("payload", ParamType::Any).in_body())
        .param(ParameterSpec::optional("goal_q", ParamType::String)),
    );

    Ok(Arc::new(base))
}

inventory::submit! {
    ModulePackage::new("manager", build)
}
