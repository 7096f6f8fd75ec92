//! Simple text utilities.

use std::sync::Arc;

use coman_core::{BoundArguments, ParamType, ParameterSpec};
use serde_json::json;

use crate::module::{EndpointSpec, Handler, HandlerError, HandlerResult, Module, ModuleBase, ModuleDescriptor};
use crate::registry::{Core, ModulePackage};

/// # Errors
///
/// Never fails; the signature matches [`crate::registry::ModuleConstructor`].
pub fn build(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
    let mut base = ModuleBase::new(ModuleDescriptor::new("text", "Simple text utilities"));
    base.register(
        EndpointSpec::get("/uppercase", Handler::sync(uppercase))
            .name("uppercase")
            .summary("Upper-case a string")
            .param(ParameterSpec::required("s", ParamType::String)),
    );
    Ok(Arc::new(base))
}

fn uppercase(args: BoundArguments) -> HandlerResult {
    let s: String = args.parse("s")?;
    if s.is_empty() {
        return Err(HandlerError::Invalid(
            "'s' must contain at least 1 character".to_string(),
        ));
    }
    Ok(json!({"result": s.to_uppercase()}))
}

inventory::submit! {
    ModulePackage::new("text", build)
}
