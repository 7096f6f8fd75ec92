//! Network module with deferred startup lifecycle.
//!
//! `new()` takes the assembled application, `start()` binds the TCP
//! listener, and `serve()` accepts connections until shutdown. The scheduler
//! lifespan is held for the whole `serve()` call.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::lifecycle::Lifecycle;
use super::middleware::with_transport;
use crate::app::App;

/// Serves an [`App`] over plain HTTP or TLS.
pub struct NetworkModule {
    config: NetworkConfig,
    app: App,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, app: App) -> Self {
        Self {
            config,
            app,
            listener: None,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(self.app.lifecycle())
    }

    /// The application router behind admission control and the transport
    /// middleware.
    pub fn build_router(&self) -> Router {
        with_transport(self.app.router(), self.lifecycle(), &self.config)
    }

    /// Binds the listener and returns the bound port, which differs from the
    /// configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests for
    /// up to `drain_timeout` and stops the scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, the scheduler cannot
    /// start, TLS material cannot be loaded, or the server fails.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .context("start() must be called before serve()")?;
        let router = self.build_router();
        let lifecycle = self.lifecycle();
        let _lifespan = self.app.lifespan()?;

        lifecycle.begin_serving();

        match &self.config.tls {
            Some(tls) => serve_tls(listener, router, tls, shutdown).await?,
            None => serve_plain(listener, router, shutdown).await?,
        }

        drain(&lifecycle, &self.config).await;
        Ok(())
    }
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Reuses the pre-bound listener by converting it to a std listener for
/// `axum-server`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .context("failed to load TLS certificates")?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "serving TLS");
    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(lifecycle: &Lifecycle, config: &NetworkConfig) {
    if lifecycle.drain(config.drain_timeout).await {
        info!("all requests drained");
    } else {
        warn!(
            in_flight = lifecycle.in_flight(),
            "drain timeout expired with requests remaining"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Settings;
    use crate::network::Phase;
    use crate::registry::Core;

    fn module(port: u16) -> NetworkModule {
        let app = App::build(Arc::new(Core::new(Settings::default())));
        NetworkModule::new(
            NetworkConfig {
                port,
                drain_timeout: Duration::from_millis(200),
                ..NetworkConfig::default()
            },
            app,
        )
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(0);
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module(0).serve(std::future::ready(())).await.unwrap_err();
        assert!(err.to_string().contains("start() must be called"));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let mut module = module(0);
        module.start().await.unwrap();
        let lifecycle = module.lifecycle();
        let scheduler = Arc::clone(module.app.scheduler());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lifecycle.phase(), Phase::Serving);
        assert!(lifecycle.readiness().ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(lifecycle.phase(), Phase::Stopped);
        assert!(!lifecycle.readiness().ready);
        assert_eq!(scheduler.state(), crate::scheduler::SchedulerState::Stopped);
    }
}
