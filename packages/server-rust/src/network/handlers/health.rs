//! Health endpoint plus liveness and readiness checks.

use axum::extract::State;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::Readiness;

/// `{status: "ok", modules: [...]}` with module names in load order.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "modules": state.core.module_names(),
    }))
}

/// Deprecated unversioned alias of [`health_handler`].
pub async fn legacy_health_handler(state: State<AppState>) -> Response {
    let mut response = health_handler(state).await.into_response();
    response.headers_mut().insert(
        HeaderName::from_static("deprecation"),
        HeaderValue::from_static("true"),
    );
    response
}

/// Liveness only proves the process answers; it never checks dependencies.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 while serving with the scheduler running, 503 otherwise. The body
/// reports the lifecycle phase and the module load outcome either way.
pub async fn readiness_handler(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let report = state.lifecycle.readiness();
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
