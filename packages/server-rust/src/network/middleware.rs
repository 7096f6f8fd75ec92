//! Transport middleware for the Coman server.
//!
//! Every request is admitted through the [`Lifecycle`] and traced with the
//! API generation and module it targets.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use coman_core::API_MAJOR_VERSION;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use super::config::NetworkConfig;
use super::lifecycle::Lifecycle;

/// Wraps the application router with admission control and the transport
/// layers. Outermost first: request id, trace, compression, CORS, timeout,
/// request id propagation, admission.
pub fn with_transport(router: Router, lifecycle: Arc<Lifecycle>, config: &NetworkConfig) -> Router {
    let request_id = HeaderName::from_static("x-request-id");
    router
        .layer(axum::middleware::from_fn_with_state(lifecycle, admit_request))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    let (api, module) = route_target(request.uri().path());
                    info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        api,
                        module,
                    )
                }))
                .layer(CompressionLayer::new())
                .layer(cors(&config.cors_origins))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                ))
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
}

/// Classifies a request path as `versioned` or `legacy` and names the
/// module segment it addresses, if any.
fn route_target(path: &str) -> (&'static str, &str) {
    let prefix = format!("/v{API_MAJOR_VERSION}/");
    let (api, rest) = match path.strip_prefix(prefix.as_str()) {
        Some(rest) => ("versioned", rest),
        None => ("legacy", path.trim_start_matches('/')),
    };
    (api, rest.split('/').next().unwrap_or_default())
}

fn cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Rejects requests with 503 once the lifecycle is closing; admitted
/// requests hold a ticket the drain waits for.
pub async fn admit_request(
    State(lifecycle): State<Arc<Lifecycle>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(_ticket) = lifecycle.admit() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(RETRY_AFTER, HeaderValue::from_static("1"))],
            Json(json!({"detail": "server is shutting down"})),
        )
            .into_response();
    };
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Settings;
    use crate::registry::Core;

    fn lifecycle() -> Arc<Lifecycle> {
        Arc::new(Lifecycle::new(Arc::new(Core::new(Settings::default())), Vec::new()))
    }

    fn app(lifecycle: &Arc<Lifecycle>) -> Router {
        let config = NetworkConfig {
            cors_origins: vec!["http://localhost:3000".to_string(), "not a url".to_string()],
            ..NetworkConfig::default()
        };
        with_transport(
            Router::new().route("/v1/text/ping", get(|| async { "pong" })),
            Arc::clone(lifecycle),
            &config,
        )
    }

    #[test]
    fn route_target_names_api_generation_and_module() {
        assert_eq!(route_target("/v1/text/uppercase"), ("versioned", "text"));
        assert_eq!(route_target("/text/uppercase"), ("legacy", "text"));
        assert_eq!(route_target("/v1/health"), ("versioned", "health"));
        assert_eq!(route_target("/"), ("legacy", ""));
    }

    #[tokio::test]
    async fn admitted_responses_carry_request_id() {
        let lifecycle = lifecycle();
        lifecycle.begin_serving();
        let response = app(&lifecycle)
            .oneshot(Request::builder().uri("/v1/text/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[tokio::test]
    async fn closing_server_turns_requests_away() {
        let lifecycle = lifecycle();
        lifecycle.close();
        let response = app(&lifecycle)
            .oneshot(Request::builder().uri("/v1/text/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "1");
        assert!(response.headers().contains_key("x-request-id"));
    }
}
