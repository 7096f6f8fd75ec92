//! Light text analysis.

use std::collections::BTreeMap;
use std::sync::Arc;

use coman_core::{BoundArguments, ParamType, ParameterSpec};
use serde_json::json;

use crate::module::{EndpointSpec, Handler, HandlerResult, Module, ModuleBase, ModuleDescriptor};
use crate::registry::{Core, ModulePackage};

/// # Errors
///
/// Never fails; the signature matches [`crate::registry::ModuleConstructor`].
pub fn build(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
    let mut base = ModuleBase::new(ModuleDescriptor::new("analysis", "Light text analysis"));
    base.register(
        EndpointSpec::post("/frequency", Handler::sync(frequency))
            .name("frequency")
            .summary("Word frequency of a text")
            .param(ParameterSpec::required("text", ParamType::String)),
    );
    Ok(Arc::new(base))
}

fn frequency(args: BoundArguments) -> HandlerResult {
    let text: String = args.parse("text")?;
    Ok(json!(word_counts(&text)))
}

/// Case-insensitive counts of whitespace-separated words.
fn word_counts(text: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for word in text.split_whitespace() {
        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

inventory::submit! {
    ModulePackage::new("analysis", build)
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::config::Settings;

    #[test]
    fn counts_are_case_insensitive() {
        let counts = word_counts("The cat and the  Hat\tthe");
        assert_eq!(counts["the"], 3);
        assert_eq!(counts["hat"], 1);
        assert_eq!(counts.len(), 4);
    }

    #[test]
    fn empty_text_yields_empty_map() {
        assert!(word_counts("   ").is_empty());
    }

    #[test]
    fn frequency_via_console() {
        let module = build(&Core::new(Settings::default())).unwrap();
        let mut args = Map::new();
        args.insert("text".to_string(), json!("a b A"));
        let result = module.invoke_console_operation("frequency", &args).unwrap();
        assert_eq!(result, json!({"a": 2, "b": 1}));
    }
}
