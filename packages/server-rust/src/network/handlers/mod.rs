//! Global HTTP handlers: health checks, the API document and the UI index.
//!
//! Module endpoints are served by the adapter in `crate::module::http`; the
//! handlers here share [`AppState`] through axum's `State` extractor.

pub mod health;
pub mod ui;

pub use health::{health_handler, legacy_health_handler, liveness_handler, readiness_handler};
pub use ui::ui_handler;

use std::sync::Arc;

use utoipa::openapi::OpenApi;

use super::Lifecycle;
use crate::registry::Core;

/// Shared state for the global handlers. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core>,
    pub lifecycle: Arc<Lifecycle>,
    /// Generated once when the application is built.
    pub openapi: Arc<OpenApi>,
}

/// Serves the generated OpenAPI document.
pub async fn openapi_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<OpenApi> {
    axum::Json(OpenApi::clone(&state.openapi))
}
