//! Endpoint declarations and the route records derived from them.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use coman_core::ParameterSpec;
use serde_json::{Map, Value};

use super::handler::Handler;

// ---------------------------------------------------------------------------
// EndpointSpec
// ---------------------------------------------------------------------------

/// Everything a module states about one endpoint at registration time.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub(crate) path: String,
    pub(crate) methods: Vec<String>,
    pub(crate) handler: Handler,
    pub(crate) name: Option<String>,
    pub(crate) summary: Option<String>,
    pub(crate) deprecated: bool,
    pub(crate) extra: Map<String, Value>,
    pub(crate) include_in_schema: bool,
    pub(crate) params: Vec<ParameterSpec>,
}

impl EndpointSpec {
    /// Declares an endpoint at `path` (relative to the module prefix) with no
    /// methods yet; registration defaults an empty method list to `GET`.
    pub fn new(path: impl Into<String>, handler: Handler) -> Self {
        Self {
            path: path.into(),
            methods: Vec::new(),
            handler,
            name: None,
            summary: None,
            deprecated: false,
            extra: Map::new(),
            include_in_schema: true,
            params: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, handler).method("GET")
    }

    pub fn post(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, handler).method("POST")
    }

    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    /// Operation name used as the primary console lookup key.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    /// Adds an entry to the documentation extension metadata.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Omits the endpoint from the generated API document.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.include_in_schema = false;
        self
    }

    #[must_use]
    pub fn param(mut self, param: ParameterSpec) -> Self {
        self.params.push(param);
        self
    }
}

// ---------------------------------------------------------------------------
// RouteRecord
// ---------------------------------------------------------------------------

/// A route as registered on a [`ModuleRouter`]: full path, normalised methods
/// and the shared handler.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub path: String,
    pub prefix: String,
    pub methods: Vec<String>,
    pub handler: Handler,
    pub handler_name: Option<String>,
    pub summary: Option<String>,
    pub deprecated: bool,
    pub extra: Map<String, Value>,
    pub include_in_schema: bool,
    pub params: Arc<[ParameterSpec]>,
    /// Set on mirrored legacy records only.
    pub sunset: Option<NaiveDate>,
    pub legacy: bool,
}

impl RouteRecord {
    /// Path with the router prefix removed.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        self.path.strip_prefix(&self.prefix).unwrap_or(&self.path)
    }
}

// ---------------------------------------------------------------------------
// ModuleRouter
// ---------------------------------------------------------------------------

/// Ordered route table under a single path prefix.
#[derive(Debug, Clone, Default)]
pub struct ModuleRouter {
    prefix: String,
    deprecated: bool,
    extra: Map<String, Value>,
    routes: Vec<RouteRecord>,
}

impl ModuleRouter {
    pub(crate) fn new(prefix: String, deprecated: bool, extra: Map<String, Value>) -> Self {
        Self {
            prefix,
            deprecated,
            extra,
            routes: Vec::new(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    /// Router-level documentation extension (`sunset` for legacy routers).
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    #[must_use]
    pub fn routes(&self) -> &[RouteRecord] {
        &self.routes
    }

    pub(crate) fn push(&mut self, record: RouteRecord) {
        self.routes.push(record);
    }
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Upper-cases, de-duplicates and sorts HTTP methods. An empty list becomes
/// `["GET"]`.
pub fn normalize_methods<I, S>(methods: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = methods
        .into_iter()
        .map(|m| m.as_ref().trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty())
        .collect();
    if set.is_empty() {
        vec!["GET".to_string()]
    } else {
        set.into_iter().collect()
    }
}

/// Ensures a non-empty relative path starts with `/`.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
