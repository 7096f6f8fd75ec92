//! Per-module route tables: versioned and legacy routers plus the console
//! operation index derived from them.
//!
//! A module declares each endpoint once through [`ModuleBase::register`]. The
//! call records the route on the versioned router (`/v{major}/{name}`) and,
//! unless legacy routes are disabled, mirrors it onto the legacy router
//! (`/{name}`) with the same handler, forced deprecation, a `[Deprecated]`
//! summary prefix and the module's sunset metadata.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use coman_core::{legacy_route_removal_date, module_version, Arguments, API_MAJOR_VERSION};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::operation::{ConsoleOperation, OperationError, OperationSummary};
use super::route::{normalize_methods, normalize_path, EndpointSpec, ModuleRouter, RouteRecord};

const DEPRECATED_PREFIX: &str = "[Deprecated] ";

// ---------------------------------------------------------------------------
// ModuleDescriptor
// ---------------------------------------------------------------------------

/// Static identity and routing policy of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Unique module name, also the route prefix segment.
    pub name: String,
    pub description: String,
    /// Explicit version; `None` falls back to [`module_version`].
    pub version: Option<String>,
    pub api_major_version: u32,
    pub enable_legacy_routes: bool,
    /// Sunset date advertised on legacy routes; `None` omits it.
    pub legacy_sunset: Option<NaiveDate>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: None,
            api_major_version: API_MAJOR_VERSION,
            enable_legacy_routes: true,
            legacy_sunset: Some(legacy_route_removal_date()),
        }
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn api_major_version(mut self, major: u32) -> Self {
        self.api_major_version = major;
        self
    }

    #[must_use]
    pub fn without_legacy_routes(mut self) -> Self {
        self.enable_legacy_routes = false;
        self
    }

    #[must_use]
    pub fn legacy_sunset(mut self, sunset: Option<NaiveDate>) -> Self {
        self.legacy_sunset = sunset;
        self
    }
}

// ---------------------------------------------------------------------------
// Registration result
// ---------------------------------------------------------------------------

/// Both artifacts of one registration.
#[derive(Debug, Clone)]
pub struct RegisteredRoute {
    pub current: RouteRecord,
    /// `None` when legacy routes are disabled for the module.
    pub legacy: Option<RouteRecord>,
}

/// A lookup key claimed by more than one operation. The first registrant
/// keeps the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCollision {
    pub key: String,
    pub kept: String,
    pub ignored: String,
}

// ---------------------------------------------------------------------------
// OperationIndex
// ---------------------------------------------------------------------------

/// Case-insensitive multi-key index over a module's versioned routes.
#[derive(Debug, Default)]
pub struct OperationIndex {
    operations: Vec<ConsoleOperation>,
    keys: HashMap<String, usize>,
    collisions: Vec<KeyCollision>,
}

impl OperationIndex {
    fn build(module: &str, router: &ModuleRouter) -> Self {
        let mut index = Self::default();
        for route in router.routes() {
            let slot = match index
                .operations
                .iter()
                .position(|op| op.handler().ptr_eq(&route.handler))
            {
                Some(existing) => existing,
                None => {
                    index.operations.push(ConsoleOperation::new(
                        operation_name(module, route),
                        module.to_string(),
                        route.clone(),
                    ));
                    index.operations.len() - 1
                }
            };

            for key in operation_keys(route) {
                match index.keys.get(&key).copied() {
                    None => {
                        index.keys.insert(key, slot);
                    }
                    Some(owner) if owner != slot => {
                        index.collisions.push(KeyCollision {
                            key,
                            kept: index.operations[owner].name().to_string(),
                            ignored: index.operations[slot].name().to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        index
    }

    /// Resolves a name case-insensitively, ignoring surrounding whitespace.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConsoleOperation> {
        let key = name.trim().to_lowercase();
        self.keys.get(&key).map(|&slot| &self.operations[slot])
    }

    /// Every lookup key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// One operation per distinct handler, in registration order.
    #[must_use]
    pub fn operations(&self) -> &[ConsoleOperation] {
        &self.operations
    }

    /// Keys whose later claimants were ignored.
    #[must_use]
    pub fn collisions(&self) -> &[KeyCollision] {
        &self.collisions
    }
}

pub(crate) fn operation_name(module: &str, route: &RouteRecord) -> String {
    let name = route
        .handler_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| route.path.trim_matches('/'));
    if name.is_empty() {
        module.to_string()
    } else {
        name.to_string()
    }
}

/// Lookup keys of a route, lower-cased and de-duplicated, in priority order:
/// handler name, full path variants, prefix-relative path.
fn operation_keys(route: &RouteRecord) -> Vec<String> {
    let path = route.path.as_str();
    let mut candidates: Vec<&str> = Vec::with_capacity(5);
    if let Some(name) = route.handler_name.as_deref() {
        candidates.push(name);
    }
    candidates.push(path);
    candidates.push(path.trim_start_matches('/'));
    candidates.push(path.trim_matches('/'));
    if let Some(short) = path.strip_prefix(route.prefix.as_str()) {
        candidates.push(short.trim_start_matches('/'));
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|key| key.trim().to_lowercase())
        .filter(|key| !key.is_empty() && key != "/")
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// ModuleBase
// ---------------------------------------------------------------------------

/// Route tables and console dispatch shared by every module.
#[derive(Debug)]
pub struct ModuleBase {
    descriptor: ModuleDescriptor,
    version: String,
    router: ModuleRouter,
    legacy_router: Option<ModuleRouter>,
    legacy_extra: Map<String, Value>,
    index: OnceLock<OperationIndex>,
}

impl ModuleBase {
    #[must_use]
    pub fn new(descriptor: ModuleDescriptor) -> Self {
        let version = descriptor
            .version
            .clone()
            .unwrap_or_else(|| module_version(&descriptor.name).to_string());

        let mut legacy_extra = Map::new();
        if let Some(sunset) = descriptor.legacy_sunset {
            legacy_extra.insert("sunset".to_string(), Value::String(sunset.to_string()));
        }

        let router = ModuleRouter::new(
            format!("/v{}/{}", descriptor.api_major_version, descriptor.name),
            false,
            Map::new(),
        );
        let legacy_router = descriptor
            .enable_legacy_routes
            .then(|| ModuleRouter::new(format!("/{}", descriptor.name), true, legacy_extra.clone()));

        Self {
            descriptor,
            version,
            router,
            legacy_router,
            legacy_extra,
            index: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// The versioned router (`/v{major}/{name}`).
    #[must_use]
    pub fn router(&self) -> &ModuleRouter {
        &self.router
    }

    /// The deprecated unversioned router (`/{name}`), if enabled.
    #[must_use]
    pub fn legacy_router(&self) -> Option<&ModuleRouter> {
        self.legacy_router.as_ref()
    }

    /// Versioned router first, then the legacy router when present.
    #[must_use]
    pub fn routers(&self) -> Vec<&ModuleRouter> {
        std::iter::once(&self.router)
            .chain(self.legacy_router.as_ref())
            .collect()
    }

    /// Registers an endpoint on the versioned router and mirrors it onto the
    /// legacy router. Never fails; an empty method list means `GET`.
    pub fn register(&mut self, spec: EndpointSpec) -> RegisteredRoute {
        let relative = normalize_path(&spec.path);
        let methods = normalize_methods(&spec.methods);
        let params: Arc<[_]> = Arc::from(spec.params);

        let current = RouteRecord {
            path: format!("{}{relative}", self.router.prefix()),
            prefix: self.router.prefix().to_string(),
            methods: methods.clone(),
            handler: spec.handler.clone(),
            handler_name: spec.name.clone(),
            summary: spec.summary.clone(),
            deprecated: spec.deprecated,
            extra: spec.extra.clone(),
            include_in_schema: spec.include_in_schema,
            params: Arc::clone(&params),
            sunset: None,
            legacy: false,
        };
        self.router.push(current.clone());

        let legacy = self.legacy_router.as_mut().map(|router| {
            let mut extra = spec.extra;
            if let Some(sunset) = self.legacy_extra.get("sunset") {
                extra
                    .entry("sunset".to_string())
                    .or_insert_with(|| sunset.clone());
            }
            let sunset = extra
                .get("sunset")
                .and_then(Value::as_str)
                .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
                .or(self.descriptor.legacy_sunset);

            let record = RouteRecord {
                path: format!("{}{relative}", router.prefix()),
                prefix: router.prefix().to_string(),
                methods,
                handler: spec.handler,
                handler_name: spec.name,
                summary: spec
                    .summary
                    .filter(|summary| !summary.is_empty())
                    .map(|summary| format!("{DEPRECATED_PREFIX}{summary}")),
                deprecated: true,
                extra,
                include_in_schema: spec.include_in_schema,
                params,
                sunset,
                legacy: true,
            };
            router.push(record.clone());
            record
        });

        debug!(
            module = %self.descriptor.name,
            path = %current.path,
            methods = %current.methods.join(","),
            legacy = legacy.is_some(),
            "route registered"
        );

        self.index.take();
        RegisteredRoute { current, legacy }
    }

    /// The operation index, built on first use after the last registration.
    pub fn operations(&self) -> &OperationIndex {
        self.index
            .get_or_init(|| OperationIndex::build(&self.descriptor.name, &self.router))
    }

    /// Resolves an operation by any of its lookup keys.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::UnknownOperation`] listing every known key.
    pub fn operation(&self, name: &str) -> Result<&ConsoleOperation, OperationError> {
        let index = self.operations();
        index.get(name).ok_or_else(|| {
            let keys = index.keys();
            OperationError::UnknownOperation {
                name: name.to_string(),
                available: if keys.is_empty() {
                    "<none>".to_string()
                } else {
                    keys.join(", ")
                },
            }
        })
    }

    /// Listing of versioned routes, de-duplicated by path and methods.
    #[must_use]
    pub fn describe_operations(&self) -> Vec<OperationSummary> {
        let mut seen = HashSet::new();
        self.router
            .routes()
            .iter()
            .filter(|route| seen.insert((route.path.clone(), route.methods.clone())))
            .map(|route| {
                ConsoleOperation::new(
                    operation_name(&self.descriptor.name, route),
                    self.descriptor.name.clone(),
                    route.clone(),
                )
                .describe()
            })
            .collect()
    }

    /// Synchronous console invocation.
    ///
    /// # Errors
    ///
    /// Lookup, binding and handler failures, see [`OperationError`].
    pub fn invoke_operation(&self, name: &str, arguments: &Arguments) -> Result<Value, OperationError> {
        self.operation(name)?.invoke(arguments)
    }

    /// Console invocation on the caller's runtime.
    ///
    /// # Errors
    ///
    /// Lookup, binding and handler failures, see [`OperationError`].
    pub async fn invoke_operation_async(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<Value, OperationError> {
        self.operation(name)?.invoke_async(arguments).await
    }
}
