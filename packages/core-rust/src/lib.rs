//! Coman Core: payload model, parameter declarations, argument binding and
//! version metadata.
//!
//! Nothing in this crate depends on a transport; the server crate builds the
//! HTTP and console paths on top of it.

pub mod binding;
pub mod messages;
pub mod params;
pub mod version;

pub use binding::{bind, ArgumentError, Arguments, BindError, BoundArguments};
pub use messages::{ModuleMessage, ModuleRequest, ModuleResponse};
pub use params::{coerce_value, parse_text, ParamDefault, ParamSource, ParamType, ParameterSpec};
pub use version::{legacy_route_removal_date, module_version, API_MAJOR_VERSION, COMAN_VERSION};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
