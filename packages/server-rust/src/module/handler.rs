//! Endpoint handlers and the errors they may return.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coman_core::{ArgumentError, BoundArguments};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

/// Result type produced by every handler.
pub type HandlerResult = Result<Value, HandlerError>;

type SyncFn = dyn Fn(BoundArguments) -> HandlerResult + Send + Sync;
type AsyncFn = dyn Fn(BoundArguments) -> BoxFuture<'static, HandlerResult> + Send + Sync;

// ---------------------------------------------------------------------------
// HandlerError
// ---------------------------------------------------------------------------

/// Domain failure raised by a handler. Maps to an HTTP status on the HTTP
/// path and propagates unchanged on the console path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Input that parsed but failed validation (e.g. an empty required string).
    #[error("{0}")]
    Invalid(String),
    /// An upstream service could not be reached or answered badly.
    #[error("{0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ArgumentError> for HandlerError {
    fn from(err: ArgumentError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "handler failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// A registered endpoint callable, either synchronous or asynchronous.
///
/// Cloning is cheap and preserves identity: clones compare equal under
/// [`Handler::ptr_eq`], which is how mirrored legacy routes and the operation
/// index recognise the same handler.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wraps a blocking function.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(BoundArguments) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps a function returning a future.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(BoundArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(args))
        }))
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Returns `true` when both handles refer to the same callable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sync(a), Self::Sync(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Self::Async(a), Self::Async(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }

    /// Calls the handler on the current task. Synchronous handlers run inline.
    pub async fn call(&self, args: BoundArguments) -> HandlerResult {
        match self {
            Self::Sync(f) => f(args),
            Self::Async(f) => f(args).await,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let handler = Handler::sync(|_| Ok(Value::Null));
        let other = Handler::sync(|_| Ok(Value::Null));
        assert!(handler.ptr_eq(&handler.clone()));
        assert!(!handler.ptr_eq(&other));
    }

    #[tokio::test]
    async fn async_handler_is_awaited() {
        let handler = Handler::from_async(|_| async { Ok(json!(5)) });
        assert!(handler.is_async());
        assert_eq!(handler.call(BoundArguments::default()).await, Ok(json!(5)));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(HandlerError::BadRequest(String::new()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(HandlerError::NotFound(String::new()).status(), StatusCode::NOT_FOUND);
        assert_eq!(HandlerError::Conflict(String::new()).status(), StatusCode::CONFLICT);
        assert_eq!(
            HandlerError::Invalid(String::new()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(HandlerError::Unavailable(String::new()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            HandlerError::from(anyhow::anyhow!("boom")),
            HandlerError::Internal("boom".to_string())
        );
    }

    #[test]
    fn error_response_carries_detail() {
        let response = HandlerError::NotFound("no such tool".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
