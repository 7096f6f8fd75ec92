//! OpenAPI document generated from the loaded modules' route tables.

use coman_core::{ParamSource, ParameterSpec, API_MAJOR_VERSION, COMAN_VERSION};
use serde_json::Value;
use utoipa::openapi::extensions::ExtensionsBuilder;
use utoipa::openapi::path::{OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::{
    ContentBuilder, Deprecated, HttpMethod, InfoBuilder, OpenApi, OpenApiBuilder, PathItem,
    PathsBuilder, Required, ResponseBuilder,
};

use crate::module::RouteRecord;
use crate::registry::Core;

/// Builds the document for every schema-visible route, including the
/// global health endpoints. Legacy operations are `deprecated` and carry
/// `x-sunset`.
#[must_use]
pub fn build_openapi(core: &Core) -> OpenApi {
    let mut paths = PathsBuilder::new();

    paths = paths
        .path(
            format!("/v{API_MAJOR_VERSION}/health"),
            PathItem::new(HttpMethod::Get, health_operation(false)),
        )
        .path("/health", PathItem::new(HttpMethod::Get, health_operation(true)));

    for module in core.modules() {
        for router in module.routers() {
            for record in router.routes().iter().filter(|r| r.include_in_schema) {
                for method in &record.methods {
                    let Some(http_method) = http_method(method) else {
                        continue;
                    };
                    let operation = route_operation(module.name(), record, method);
                    paths = paths.path(record.path.clone(), PathItem::new(http_method, operation));
                }
            }
        }
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title("Coman")
                .version(COMAN_VERSION)
                .description(Some("Modular backend: versioned module routes and console operations"))
                .build(),
        )
        .paths(paths.build())
        .build()
}

fn health_operation(legacy: bool) -> utoipa::openapi::path::Operation {
    OperationBuilder::new()
        .tag("health")
        .operation_id(Some(if legacy { "legacy_health" } else { "health" }))
        .summary(Some(if legacy {
            "[Deprecated] Service health"
        } else {
            "Service health"
        }))
        .deprecated(Some(if legacy { Deprecated::True } else { Deprecated::False }))
        .response("200", ResponseBuilder::new().description("Status and loaded modules").build())
        .build()
}

fn route_operation(module: &str, record: &RouteRecord, method: &str) -> utoipa::openapi::path::Operation {
    let name = record
        .handler_name
        .clone()
        .unwrap_or_else(|| record.relative_path().trim_matches('/').replace('/', "_"));
    let prefix = if record.legacy { "legacy_" } else { "" };
    let operation_id = format!("{prefix}{module}_{name}_{}", method.to_ascii_lowercase());

    let mut builder = OperationBuilder::new()
        .tag(module)
        .operation_id(Some(operation_id))
        .summary(record.summary.clone())
        .deprecated(Some(if record.deprecated {
            Deprecated::True
        } else {
            Deprecated::False
        }))
        .response("200", ResponseBuilder::new().description("Successful Response").build())
        .response("422", ResponseBuilder::new().description("Validation Error").build());

    for param in record.params.iter() {
        if let Some(location) = parameter_in(param) {
            let name = match location {
                ParameterIn::Header => param.name.replace('_', "-"),
                _ => param.name.clone(),
            };
            let required = param.is_required() || matches!(location, ParameterIn::Path);
            builder = builder.parameter(
                ParameterBuilder::new()
                    .name(name)
                    .parameter_in(location)
                    .required(if required { Required::True } else { Required::False }),
            );
        }
    }

    let body_params: Vec<&ParameterSpec> = record
        .params
        .iter()
        .filter(|p| p.source == ParamSource::Body)
        .collect();
    if !body_params.is_empty() {
        let required = body_params.iter().any(|p| p.is_required());
        builder = builder.request_body(Some(
            RequestBodyBuilder::new()
                .content("application/json", ContentBuilder::new().build())
                .required(Some(if required { Required::True } else { Required::False }))
                .build(),
        ));
    }

    if !record.extra.is_empty() {
        let extensions = record
            .extra
            .iter()
            .fold(ExtensionsBuilder::new(), |ext, (key, value)| {
                let key = if key.starts_with("x-") {
                    key.clone()
                } else {
                    format!("x-{key}")
                };
                ext.add(key, Value::clone(value))
            })
            .build();
        builder = builder.extensions(Some(extensions));
    }

    builder.build()
}

fn parameter_in(param: &ParameterSpec) -> Option<ParameterIn> {
    match param.source {
        ParamSource::Query => Some(ParameterIn::Query),
        ParamSource::Path => Some(ParameterIn::Path),
        ParamSource::Header => Some(ParameterIn::Header),
        ParamSource::Body => None,
    }
}

fn http_method(method: &str) -> Option<HttpMethod> {
    match method {
        "GET" => Some(HttpMethod::Get),
        "POST" => Some(HttpMethod::Post),
        "PUT" => Some(HttpMethod::Put),
        "PATCH" => Some(HttpMethod::Patch),
        "DELETE" => Some(HttpMethod::Delete),
        "HEAD" => Some(HttpMethod::Head),
        "OPTIONS" => Some(HttpMethod::Options),
        "TRACE" => Some(HttpMethod::Trace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coman_core::ParamType;
    use serde_json::json;

    use super::*;
    use crate::config::Settings;
    use crate::module::{EndpointSpec, Handler, ModuleBase, ModuleDescriptor};

    fn document() -> Value {
        let mut base = ModuleBase::new(ModuleDescriptor::new("sample", "Sample"));
        base.register(
            EndpointSpec::get("/sample", Handler::sync(|_| Ok(json!(1))))
                .name("sample")
                .summary("Sample operation")
                .param(ParameterSpec::with_default("value", ParamType::Integer, 1)),
        );
        base.register(EndpointSpec::get("/internal", Handler::sync(|_| Ok(json!(0)))).hidden());
        let mut core = Core::new(Settings::default());
        core.register(Arc::new(base)).unwrap();
        serde_json::to_value(build_openapi(&core)).unwrap()
    }

    #[test]
    fn versioned_and_legacy_operations_are_documented() {
        let doc = document();
        let current = &doc["paths"]["/v1/sample/sample"]["get"];
        assert_eq!(current["summary"], "Sample operation");
        assert_eq!(current["parameters"][0]["name"], "value");
        assert!(current.get("x-sunset").is_none());

        let legacy = &doc["paths"]["/sample/sample"]["get"];
        assert_eq!(legacy["deprecated"], true);
        assert_eq!(legacy["summary"], "[Deprecated] Sample operation");
        assert_eq!(legacy["x-sunset"], "2025-09-30");
    }

    #[test]
    fn hidden_routes_are_omitted() {
        let doc = document();
        assert!(doc["paths"].get("/v1/sample/internal").is_none());
        assert!(doc["paths"].get("/sample/internal").is_none());
    }

    #[test]
    fn health_endpoints_are_listed() {
        let doc = document();
        assert!(doc["paths"].get("/v1/health").is_some());
        assert_eq!(doc["paths"]["/health"]["get"]["deprecated"], true);
        assert_eq!(doc["info"]["version"], COMAN_VERSION);
    }
}
