//! Application composer: mounts every module, the health endpoints, the API
//! document and the UI, and owns the scheduler lifespan.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use coman_core::API_MAJOR_VERSION;
use tracing::{error, info, warn};

use crate::module::http::module_router;
use crate::module::operation::panic_message;
use crate::network::handlers::{
    health_handler, legacy_health_handler, liveness_handler, openapi_handler, readiness_handler,
    ui_handler, AppState,
};
use crate::network::Lifecycle;
use crate::openapi::build_openapi;
use crate::registry::Core;
use crate::scheduler::{Scheduler, SchedulerError};

/// Top-level path segments owned by the application itself.
const RESERVED_NAMES: &[&str] = &["health", "ui", "openapi.json"];

/// The assembled application.
pub struct App {
    core: Arc<Core>,
    scheduler: Arc<Scheduler>,
    lifecycle: Arc<Lifecycle>,
    router: Router,
}

impl App {
    /// Creates and attaches the scheduler, lets each module register its
    /// jobs, and mounts all routers. A module whose schedule registration
    /// fails or panics is still mounted.
    #[must_use]
    pub fn build(core: Arc<Core>) -> Self {
        let scheduler = Arc::new(Scheduler::new());
        core.attach_scheduler(Arc::clone(&scheduler));

        let mut unscheduled = Vec::new();
        for module in core.modules() {
            match catch_unwind(AssertUnwindSafe(|| module.register_schedules(&scheduler))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => {
                    error!(module = module.name(), error = %format!("{err:#}"), "schedule registration failed");
                }
                Err(panic) => {
                    error!(
                        module = module.name(),
                        panic = %panic_message(panic.as_ref()),
                        "schedule registration panicked"
                    );
                }
            }
            unscheduled.push(module.name().to_string());
        }

        let lifecycle = Arc::new(Lifecycle::new(Arc::clone(&core), unscheduled));
        let state = AppState {
            core: Arc::clone(&core),
            lifecycle: Arc::clone(&lifecycle),
            openapi: Arc::new(build_openapi(&core)),
        };

        let mut router = Router::new()
            .route(&format!("/v{API_MAJOR_VERSION}/health"), get(health_handler))
            .route("/health", get(legacy_health_handler))
            .route(&format!("/v{API_MAJOR_VERSION}/health/live"), get(liveness_handler))
            .route(&format!("/v{API_MAJOR_VERSION}/health/ready"), get(readiness_handler))
            .route("/openapi.json", get(openapi_handler))
            .with_state(state.clone());

        for module in core.modules() {
            if RESERVED_NAMES.contains(&module.name())
                || module.name() == format!("v{API_MAJOR_VERSION}")
            {
                warn!(module = module.name(), "module name is reserved, routes not mounted");
                continue;
            }
            router = router.merge(module_router(module.as_ref()));
        }

        router = router.merge(Router::new().route("/ui", get(ui_handler)).with_state(state));

        info!(
            modules = core.modules().len(),
            jobs = scheduler.job_names().len(),
            "application assembled"
        );

        Self {
            core,
            scheduler,
            lifecycle,
            router,
        }
    }

    #[must_use]
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// The application router without transport middleware.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Starts the scheduler; the returned guard stops it when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn lifespan(&self) -> Result<Lifespan, SchedulerError> {
        self.scheduler.start()?;
        Ok(Lifespan {
            core: Arc::clone(&self.core),
        })
    }
}

/// Scoped startup/shutdown hook for the scheduler.
#[must_use = "dropping the lifespan stops the scheduler"]
pub struct Lifespan {
    core: Arc<Core>,
}

impl Drop for Lifespan {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Settings;
    use crate::module::{EndpointSpec, Handler, Module, ModuleBase, ModuleDescriptor};
    use crate::scheduler::SchedulerState;

    #[derive(Clone, Copy)]
    enum Registration {
        Ok,
        Fails,
        Panics,
    }

    struct Cronned {
        base: ModuleBase,
        registration: Registration,
    }

    impl Module for Cronned {
        fn base(&self) -> &ModuleBase {
            &self.base
        }

        fn register_schedules(&self, scheduler: &Scheduler) -> anyhow::Result<()> {
            match self.registration {
                Registration::Ok => {}
                Registration::Fails => anyhow::bail!("bad cron"),
                Registration::Panics => panic!("scheduler state poisoned"),
            }
            scheduler.add_cron(
                &format!("{}-job", self.name()),
                "0 3 * * *",
                || async { Ok::<(), anyhow::Error>(()) },
            )?;
            Ok(())
        }
    }

    fn app() -> App {
        let mut sample = ModuleBase::new(ModuleDescriptor::new("sample", "Sample"));
        sample.register(
            EndpointSpec::get("/sample", Handler::sync(|_| Ok(json!({"ok": 1})))).name("sample"),
        );
        let mut core = Core::new(Settings::default());
        core.register(Arc::new(sample)).unwrap();
        for (name, registration) in [
            ("broken", Registration::Fails),
            ("panicky", Registration::Panics),
            ("cron", Registration::Ok),
        ] {
            core.register(Arc::new(Cronned {
                base: ModuleBase::new(ModuleDescriptor::new(name, "Cron")),
                registration,
            }))
            .unwrap();
        }
        App::build(Arc::new(core))
    }

    async fn get_json(app: &App, uri: &str) -> (StatusCode, Value) {
        let response = app
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_modules() {
        let app = app();
        let expected = json!({"status": "ok", "modules": ["sample", "broken", "panicky", "cron"]});
        assert_eq!(get_json(&app, "/v1/health").await, (StatusCode::OK, expected.clone()));
        assert_eq!(get_json(&app, "/health").await, (StatusCode::OK, expected));
    }

    #[tokio::test]
    async fn module_routes_are_mounted_on_both_prefixes() {
        let app = app();
        assert_eq!(get_json(&app, "/v1/sample/sample").await.1, json!({"ok": 1}));
        assert_eq!(get_json(&app, "/sample/sample").await.1, json!({"ok": 1}));
    }

    #[tokio::test]
    async fn openapi_and_ui_are_served() {
        let app = app();
        let (status, doc) = get_json(&app, "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"].get("/v1/sample/sample").is_some());

        let response = app
            .router()
            .oneshot(Request::builder().uri("/ui").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[cfg(feature = "scheduler")]
    #[test]
    fn failing_or_panicking_schedule_registration_does_not_abort_build() {
        let app = app();
        assert_eq!(app.scheduler().job_names(), vec!["cron-job"]);
        assert!(app.core().scheduler().is_some());
        assert_eq!(app.lifecycle().readiness().unscheduled, ["broken", "panicky"]);
    }

    #[tokio::test]
    async fn lifespan_starts_and_stops_scheduler() {
        let app = app();
        {
            let _lifespan = app.lifespan().unwrap();
            assert_eq!(app.scheduler().state(), SchedulerState::Running);
        }
        assert_eq!(app.scheduler().state(), SchedulerState::Stopped);
    }
}
