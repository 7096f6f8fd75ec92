//! Capability registry persisted as JSON.

use std::sync::Arc;

use coman_core::messages::{Capability, CapabilityRegistry};
use coman_core::{BoundArguments, ModuleMessage, ParamType, ParameterSpec};
use serde_json::json;
use tracing::info;

use super::store::JsonStore;
use crate::module::{EndpointSpec, Handler, HandlerResult, Module, ModuleBase, ModuleDescriptor};
use crate::registry::{Core, ModulePackage};

type Store = Arc<JsonStore<CapabilityRegistry>>;

fn list(store: &Store) -> HandlerResult {
    Ok(serde_json::to_value(store.load()?).map_err(anyhow::Error::from)?)
}

/// Upserts a capability, replacing entries named like it or like
/// `original_name` when renaming.
fn register(store: &Store, args: &BoundArguments) -> HandlerResult {
    let capability = Capability::from_payload(json!({
        "name": args.parse::<String>("name")?,
        "kind": args.parse::<String>("kind")?,
        "endpoint": args.parse::<String>("endpoint")?,
        "description": args.parse::<String>("description")?,
    }));
    let original_name: Option<String> = args.parse_optional("original_name")?;
    let name = capability.name.clone();

    let count = store.update(|registry| {
        registry.upsert(capability, original_name.as_deref());
        registry.len()
    })?;
    info!(capability = %name, count, "capability registered");
    Ok(json!({"ok": true, "count": count}))
}

fn delete(store: &Store, args: &BoundArguments) -> HandlerResult {
    let name: String = args.parse("name")?;
    let deleted = store.update(|registry| registry.remove(&name))?;
    if deleted > 0 {
        info!(capability = %name, "capability deleted");
    }
    Ok(json!({"ok": true, "deleted": deleted}))
}

/// # Errors
///
/// Never fails; the signature matches [`crate::registry::ModuleConstructor`].
pub fn build(core: &Core) -> anyhow::Result<Arc<dyn Module>> {
    let store: Store = Arc::new(JsonStore::new(core.settings().data_file("capabilities.json")));
    let mut base = ModuleBase::new(ModuleDescriptor::new(
        "orchestrator",
        "Capability registry for routing goals to modules",
    ));

    let s = Arc::clone(&store);
    base.register(
        EndpointSpec::get("/capabilities", Handler::sync(move |_| list(&s)))
            .name("capabilities")
            .summary("List registered capabilities"),
    );

    let s = Arc::clone(&store);
    base.register(
        EndpointSpec::post("/capabilities/register", Handler::sync(move |args| register(&s, &args)))
            .name("register_capability")
            .summary("Register or rename a capability")
            .param(ParameterSpec::required("name", ParamType::String))
            .param(ParameterSpec::with_default("kind", ParamType::String, "webhook"))
            .param(ParameterSpec::with_default("endpoint", ParamType::String, ""))
            .param(ParameterSpec::with_default("description", ParamType::String, ""))
            .param(ParameterSpec::optional("original_name", ParamType::String)),
    );

    let s = store;
    base.register(
        EndpointSpec::post("/capabilities/delete", Handler::sync(move |args| delete(&s, &args)))
            .name("delete_capability")
            .summary("Delete a capability by name")
            .param(ParameterSpec::required("name", ParamType::String)),
    );

    Ok(Arc::new(base))
}

inventory::submit! {
    ModulePackage::new("orchestrator", build)
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value};

    use super::*;
    use crate::config::Settings;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn module(dir: &tempfile::TempDir) -> Arc<dyn Module> {
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        build(&Core::new(settings)).unwrap()
    }

    #[test]
    fn empty_registry_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let listed = module(&dir).invoke_console_operation("capabilities", &Map::new()).unwrap();
        assert_eq!(listed, json!({"capabilities": []}));
    }

    #[test]
    fn register_applies_defaults_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let module = module(&dir);
        let out = module
            .invoke_console_operation("register_capability", &args(json!({"name": "scrape"})))
            .unwrap();
        assert_eq!(out, json!({"ok": true, "count": 1}));

        let listed = module.invoke_console_operation("capabilities", &Map::new()).unwrap();
        assert_eq!(
            listed["capabilities"][0],
            json!({"name": "scrape", "kind": "webhook", "endpoint": "", "description": ""})
        );
    }

    #[test]
    fn rename_replaces_original_entry() {
        let dir = tempfile::tempdir().unwrap();
        let module = module(&dir);
        for name in ["a", "b"] {
            module
                .invoke_console_operation("register_capability", &args(json!({"name": name})))
                .unwrap();
        }
        let out = module
            .invoke_console_operation(
                "register_capability",
                &args(json!({"name": "c", "original_name": "a", "kind": "  "})),
            )
            .unwrap();
        assert_eq!(out["count"], 2);

        let listed = module.invoke_console_operation("capabilities", &Map::new()).unwrap();
        let names: Vec<&str> = listed["capabilities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(listed["capabilities"][1]["kind"], "webhook");
    }

    #[test]
    fn delete_reports_removed_count() {
        let dir = tempfile::tempdir().unwrap();
        let module = module(&dir);
        module
            .invoke_console_operation("register_capability", &args(json!({"name": "x"})))
            .unwrap();
        let first = module
            .invoke_console_operation("delete_capability", &args(json!({"name": "x"})))
            .unwrap();
        let second = module
            .invoke_console_operation("delete_capability", &args(json!({"name": "x"})))
            .unwrap();
        assert_eq!(first, json!({"ok": true, "deleted": 1}));
        assert_eq!(second, json!({"ok": true, "deleted": 0}));
    }
}
