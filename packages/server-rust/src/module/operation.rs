//! Console operations: module endpoints invoked by name, without HTTP.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use coman_core::{bind, Arguments, BindError, BoundArguments};
use futures_util::future::BoxFuture;
use futures_util::FutureExt as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info_span, Instrument, Span};

use super::handler::{Handler, HandlerError, HandlerResult};
use super::route::RouteRecord;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by console lookup and invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("unknown operation '{name}'. Available operations: {available}")]
    UnknownOperation { name: String, available: String },
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("console runtime failure: {0}")]
    Runtime(String),
}

// ---------------------------------------------------------------------------
// OperationSummary
// ---------------------------------------------------------------------------

/// Serializable description of an operation for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub name: String,
    pub path: String,
    pub methods: Vec<String>,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// ConsoleOperation
// ---------------------------------------------------------------------------

/// One invokable capability of a module: a route record plus its owner.
#[derive(Debug, Clone)]
pub struct ConsoleOperation {
    name: String,
    module: String,
    route: RouteRecord,
}

impl ConsoleOperation {
    pub(crate) fn new(name: String, module: String, route: RouteRecord) -> Self {
        Self {
            name,
            module,
            route,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn route(&self) -> &RouteRecord {
        &self.route
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.route.handler
    }

    #[must_use]
    pub fn describe(&self) -> OperationSummary {
        OperationSummary {
            name: self.name.clone(),
            path: self.route.path.clone(),
            methods: self.route.methods.clone(),
            summary: self.route.summary.clone().unwrap_or_default(),
        }
    }

    /// Binds `arguments` against the declared parameters.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::MissingArgument`] for the first required parameter
    /// without a value.
    pub fn bind(&self, arguments: &Arguments) -> Result<BoundArguments, BindError> {
        bind(&self.name, &self.route.params, arguments)
    }

    /// Invokes the operation synchronously.
    ///
    /// Asynchronous handlers run to completion on a single-shot runtime owned
    /// by this call; see [`run_console_future`].
    ///
    /// # Errors
    ///
    /// Returns a binding error, the handler's own error, or
    /// [`OperationError::Runtime`] if the console runtime cannot be created
    /// or the handler panics.
    pub fn invoke(&self, arguments: &Arguments) -> Result<Value, OperationError> {
        let span = self.span();
        let _entered = span.enter();
        let start = Instant::now();

        let result = self.bind(arguments).map_err(OperationError::from).and_then(|bound| {
            match &self.route.handler {
                Handler::Sync(f) => catch_unwind(AssertUnwindSafe(|| f(bound)))
                    .map_err(|panic| handler_panicked(panic.as_ref()))?
                    .map_err(OperationError::from),
                Handler::Async(f) => run_console_future(f(bound))?.map_err(OperationError::from),
            }
        });

        self.record_outcome(&span, start, result.is_ok());
        result
    }

    /// Invokes the operation on the caller's runtime.
    ///
    /// # Errors
    ///
    /// Returns a binding error, the handler's own error, or
    /// [`OperationError::Runtime`] if the handler panics.
    pub async fn invoke_async(&self, arguments: &Arguments) -> Result<Value, OperationError> {
        let span = self.span();
        let start = Instant::now();
        let result = async {
            let bound = self.bind(arguments)?;
            AssertUnwindSafe(self.route.handler.call(bound))
                .catch_unwind()
                .await
                .map_err(|panic| handler_panicked(panic.as_ref()))?
                .map_err(OperationError::from)
        }
        .instrument(span.clone())
        .await;
        self.record_outcome(&span, start, result.is_ok());
        result
    }

    fn span(&self) -> Span {
        info_span!(
            "console_operation",
            coman.module = %self.module,
            coman.operation = %self.name,
            coman.route = %self.route.path,
            coman.methods = %self.route.methods.join(","),
            call_id = %uuid::Uuid::new_v4(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    }

    fn record_outcome(&self, span: &Span, start: Instant, ok: bool) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = if ok { "ok" } else { "error" };
        span.record("duration_ms", duration_ms);
        span.record("outcome", outcome);
        tracing::debug!(
            module = %self.module,
            operation = %self.name,
            duration_ms,
            outcome,
            "console operation complete"
        );
    }
}

// ---------------------------------------------------------------------------
// Console runner
// ---------------------------------------------------------------------------

/// Drives a handler future to completion on a fresh current-thread runtime
/// that is dropped afterwards. Never touches the server's runtime: when the
/// caller is itself on a runtime thread, the future runs on a scoped helper
/// thread.
///
/// # Errors
///
/// Returns [`OperationError::Runtime`] if the runtime cannot be built or the
/// future panics.
pub fn run_console_future(
    future: BoxFuture<'static, HandlerResult>,
) -> Result<HandlerResult, OperationError> {
    let run = move || -> Result<HandlerResult, OperationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| OperationError::Runtime(e.to_string()))?;
        catch_unwind(AssertUnwindSafe(|| runtime.block_on(future)))
            .map_err(|panic| handler_panicked(panic.as_ref()))
    };

    if tokio::runtime::Handle::try_current().is_ok() {
        std::thread::scope(|scope| scope.spawn(run).join())
            .map_err(|_| OperationError::Runtime("console task panicked".to_string()))?
    } else {
        run()
    }
}

/// Text carried by a panic payload, for `&str` and `String` payloads.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn handler_panicked(panic: &(dyn Any + Send)) -> OperationError {
    OperationError::Runtime(format!("handler panicked: {}", panic_message(panic)))
}
