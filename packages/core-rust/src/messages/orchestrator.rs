//! Orchestrator payloads: the capability registry.

use serde::{Deserialize, Serialize};

use super::base::{ModuleMessage, ModuleResponse};

const DEFAULT_KIND: &str = "webhook";

/// A capability exposed by some module or external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capability {
    pub name: String,
    pub kind: String,
    pub endpoint: String,
    pub description: String,
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: DEFAULT_KIND.to_string(),
            endpoint: String::new(),
            description: String::new(),
        }
    }
}

impl ModuleMessage for Capability {
    fn normalize(&mut self) {
        let kind = self.kind.trim();
        self.kind = if kind.is_empty() {
            DEFAULT_KIND.to_string()
        } else {
            kind.to_string()
        };
        self.endpoint = self.endpoint.trim().to_string();
        self.description = self.description.trim().to_string();
    }
}

impl ModuleResponse for Capability {}

/// Ordered list of capabilities, persisted by the orchestrator module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityRegistry {
    pub capabilities: Vec<Capability>,
}

impl CapabilityRegistry {
    pub fn add(&mut self, capability: Capability) {
        self.capabilities.push(capability);
    }

    /// Removes entries named like `capability` (or `original_name`, for
    /// renames) and appends `capability`.
    pub fn upsert(&mut self, capability: Capability, original_name: Option<&str>) {
        self.capabilities.retain(|existing| {
            existing.name != capability.name && Some(existing.name.as_str()) != original_name
        });
        self.capabilities.push(capability);
    }

    /// Removes every entry with the given name and returns how many were
    /// removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.capabilities.len();
        self.capabilities.retain(|existing| existing.name != name);
        before - self.capabilities.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl ModuleMessage for CapabilityRegistry {
    fn normalize(&mut self) {
        for capability in &mut self.capabilities {
            capability.normalize();
        }
    }
}

impl ModuleResponse for CapabilityRegistry {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn capability(name: &str) -> Capability {
        Capability {
            name: name.to_string(),
            ..Capability::default()
        }
    }

    #[test]
    fn blank_kind_falls_back_to_webhook() {
        let cap = Capability::from_payload(json!({
            "name": "notify",
            "kind": "   ",
            "endpoint": " http://hooks.local/notify ",
        }));
        assert_eq!(cap.kind, "webhook");
        assert_eq!(cap.endpoint, "http://hooks.local/notify");
    }

    #[test]
    fn upsert_handles_rename() {
        let mut registry = CapabilityRegistry::default();
        registry.add(capability("old"));
        registry.add(capability("other"));
        registry.upsert(capability("new"), Some("old"));
        let names: Vec<_> = registry.capabilities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["other", "new"]);
    }

    #[test]
    fn remove_reports_deleted_count() {
        let mut registry = CapabilityRegistry::default();
        registry.add(capability("a"));
        registry.add(capability("a"));
        registry.add(capability("b"));
        assert_eq!(registry.remove("a"), 2);
        assert_eq!(registry.remove("a"), 0);
        assert_eq!(registry.len(), 1);
    }
}
