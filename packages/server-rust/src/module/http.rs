//! HTTP adapter: turns module route tables into axum routers.
//!
//! Each route record becomes an axum route at its full path. Arguments are
//! collected from the query string, path captures, headers and the JSON body
//! according to each parameter's declared source, then bound with the same
//! algorithm as the console path.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{Query, RawPathParams};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::NaiveDate;
use coman_core::{bind, parse_text, Arguments, ParamSource, ParamType, ParameterSpec};
use serde_json::Value;
use tracing::{debug, warn};

use super::base::operation_name;
use super::handler::{Handler, HandlerError};
use super::route::{ModuleRouter, RouteRecord};
use super::Module;

static DEPRECATION: HeaderName = HeaderName::from_static("deprecation");
static SUNSET: HeaderName = HeaderName::from_static("sunset");

/// Shared per-route state captured by the axum handler closure.
struct RouteContext {
    record: RouteRecord,
    operation: String,
    /// Positional capture name to the name the route declared.
    captures: Vec<(String, String)>,
}

impl RouteContext {
    fn declared_capture(&self, positional: &str) -> String {
        self.captures
            .iter()
            .find(|(p, _)| p == positional)
            .map_or_else(|| positional.to_string(), |(_, declared)| declared.clone())
    }
}

/// Builds one axum router holding every router of the module.
pub fn module_router(module: &dyn Module) -> Router {
    module
        .routers()
        .into_iter()
        .fold(Router::new(), |app, router| app.merge(router_for(router)))
}

/// Builds an axum router for one module router.
///
/// Routes whose paths differ only in capture names share one axum path.
/// Duplicate `(path, method)` pairs are skipped with a warning; the first
/// registration is served.
pub fn router_for(router: &ModuleRouter) -> Router {
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for record in router.routes() {
        let (path, captures) = canonical_path(&record.path);
        let context = Arc::new(RouteContext {
            operation: operation_name(router.prefix().trim_start_matches('/'), record),
            record: record.clone(),
            captures,
        });

        for method in &record.methods {
            let Some(filter) = method_filter(method) else {
                warn!(path = %record.path, %method, "unsupported HTTP method, route skipped");
                continue;
            };
            if !seen.insert((path.clone(), method.clone())) {
                warn!(path = %record.path, %method, "duplicate route, keeping first registration");
                continue;
            }

            let context = Arc::clone(&context);
            let handler = move |path: Result<RawPathParams, RawPathParamsRejection>,
                                Query(query): Query<Vec<(String, String)>>,
                                headers: HeaderMap,
                                body: Bytes| {
                let context = Arc::clone(&context);
                async move {
                    let path: Vec<(String, String)> = path
                        .map(|params| {
                            params
                                .iter()
                                .map(|(k, v)| (context.declared_capture(k), v.to_string()))
                                .collect()
                        })
                        .unwrap_or_default();
                    dispatch(&context, &path, &query, &headers, &body).await
                }
            };

            let method_router = match by_path.remove(&path) {
                Some(existing) => existing.on(filter, handler),
                None => on(filter, handler),
            };
            by_path.insert(path.clone(), method_router);
        }
    }

    by_path
        .into_iter()
        .fold(Router::new(), |app, (path, method_router)| {
            app.route(&path, method_router)
        })
}

/// Renames every `{name}` or `{*name}` segment to `{p<i>}` or `{*p<i>}` by
/// position. Returns the rewritten path and the positional to declared name
/// pairs.
fn canonical_path(path: &str) -> (String, Vec<(String, String)>) {
    let mut captures = Vec::new();
    let segments: Vec<String> = path
        .split('/')
        .map(|segment| {
            let Some(capture) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                return segment.to_string();
            };
            let (wildcard, name) = match capture.strip_prefix('*') {
                Some(name) => ("*", name),
                None => ("", capture),
            };
            let positional = format!("p{}", captures.len());
            let segment = format!("{{{wildcard}{positional}}}");
            captures.push((positional, name.to_string()));
            segment
        })
        .collect();
    (segments.join("/"), captures)
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    let method = Method::from_bytes(method.as_bytes()).ok()?;
    MethodFilter::try_from(method).ok()
}

async fn dispatch(
    context: &RouteContext,
    path: &[(String, String)],
    query: &[(String, String)],
    headers: &HeaderMap,
    body: &Bytes,
) -> Response {
    let record = &context.record;

    let arguments = match collect_arguments(&record.params, path, query, headers, body) {
        Ok(arguments) => arguments,
        Err(reason) => {
            debug!(path = %record.path, %reason, "request rejected");
            return with_legacy_headers(record, HandlerError::Invalid(reason).into_response());
        }
    };

    let bound = match bind(&context.operation, &record.params, &arguments) {
        Ok(bound) => bound,
        Err(err) => {
            debug!(path = %record.path, error = %err, "binding failed");
            return with_legacy_headers(record, HandlerError::Invalid(err.to_string()).into_response());
        }
    };

    let result = match &record.handler {
        Handler::Sync(f) => {
            let f = Arc::clone(f);
            tokio::task::spawn_blocking(move || f(bound))
                .await
                .unwrap_or_else(|e| Err(HandlerError::Internal(format!("handler panicked: {e}"))))
        }
        Handler::Async(f) => f(bound).await,
    };

    let response = match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => err.into_response(),
    };
    with_legacy_headers(record, response)
}

/// Gathers raw arguments from the request according to each parameter's
/// source. Absent values are left out so that binding applies defaults.
fn collect_arguments(
    params: &[ParameterSpec],
    path: &[(String, String)],
    query: &[(String, String)],
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Arguments, String> {
    let body_params = params
        .iter()
        .filter(|p| p.source == ParamSource::Body)
        .count();
    let body_value: Option<Value> = if body_params == 0 || body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(body).map_err(|e| format!("invalid JSON body: {e}"))?)
    };

    let mut arguments = Arguments::new();
    for param in params {
        let invalid = |reason: String| format!("invalid value for '{}': {reason}", param.name);
        let raw = match param.source {
            ParamSource::Query => {
                let values: Vec<&str> = query
                    .iter()
                    .filter(|(key, _)| *key == param.name)
                    .map(|(_, value)| value.as_str())
                    .collect();
                match values.as_slice() {
                    [] => None,
                    [.., last] if param.ty != ParamType::List || values.len() == 1 => {
                        Some(parse_text(last, param.ty).map_err(invalid)?)
                    }
                    many => Some(Value::Array(
                        many.iter().map(|v| Value::String((*v).to_string())).collect(),
                    )),
                }
            }
            ParamSource::Path => path
                .iter()
                .find(|(key, _)| *key == param.name)
                .map(|(_, value)| parse_text(value, param.ty))
                .transpose()
                .map_err(invalid)?,
            ParamSource::Header => match headers.get(param.name.replace('_', "-")) {
                Some(value) => {
                    let text = value
                        .to_str()
                        .map_err(|_| invalid("header is not valid text".to_string()))?;
                    Some(parse_text(text, param.ty).map_err(invalid)?)
                }
                None => None,
            },
            ParamSource::Body => body_value.as_ref().and_then(|body| {
                if body_params == 1 {
                    Some(body.clone())
                } else {
                    body.get(&param.name).cloned()
                }
            }),
        };
        if let Some(value) = raw {
            arguments.insert(param.name.clone(), value);
        }
    }
    Ok(arguments)
}

/// Adds `Deprecation` and `Sunset` headers to responses from legacy routes.
fn with_legacy_headers(record: &RouteRecord, mut response: Response) -> Response {
    if !record.legacy {
        return response;
    }
    let headers = response.headers_mut();
    headers.insert(DEPRECATION.clone(), HeaderValue::from_static("true"));
    if let Some(value) = record.sunset.and_then(http_date) {
        headers.insert(SUNSET.clone(), value);
    }
    response
}

fn http_date(date: NaiveDate) -> Option<HeaderValue> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    HeaderValue::from_str(&midnight.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).ok()
}
