//! Prometheus scrape endpoint.

use crate::core::MetricsConfig;
use crate::error::{ReloadError, Result};
use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// How long in-flight scrapes may take once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Must happen before any reloader creates its metric handles.
///
/// # Errors
///
/// Returns [`ReloadError::Metrics`] if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ReloadError::Metrics(format!("failed to install recorder: {}", e)))
}

/// Go style `:9090` means every interface.
fn listen_address(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_string()
    }
}

/// HTTP server rendering the recorder's metrics on one path.
pub struct MetricsServer {
    listener: TcpListener,
    path: String,
    handle: PrometheusHandle,
}

impl MetricsServer {
    /// Bind the endpoint described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::Metrics`] if no listen address is configured, the path
    /// is not a plain absolute path, or the address cannot be bound.
    pub async fn bind(config: &MetricsConfig, handle: PrometheusHandle) -> Result<Self> {
        let listen = config
            .listen_addr()
            .ok_or_else(|| ReloadError::Metrics("no listen address configured".to_string()))?;

        let path = config.path.trim();
        if !path.starts_with('/') || path.contains(['{', '}', '*']) {
            return Err(ReloadError::Metrics(format!(
                "invalid metrics path '{}'",
                config.path
            )));
        }

        let listener = TcpListener::bind(listen_address(listen))
            .await
            .map_err(|e| ReloadError::Metrics(format!("failed to listen on {}: {}", listen, e)))?;

        Ok(Self {
            listener,
            path: path.to_string(),
            handle,
        })
    }

    /// Address the endpoint is listening on.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` becomes `true`, then drain for at most
    /// [`SHUTDOWN_GRACE`].
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::Io`] if the server fails.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let handle = self.handle;
        let app = Router::new().route(
            &self.path,
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );

        if let Ok(addr) = self.listener.local_addr() {
            info!(address = %addr, path = %self.path, "serving metrics");
        }

        let mut graceful = shutdown.clone();
        let server = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = graceful.wait_for(|stop| *stop).await;
            })
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => return result.map_err(ReloadError::from),
            _ = shutdown.wait_for(|stop| *stop) => {}
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(result) => result.map_err(ReloadError::from),
            Err(_) => {
                warn!(grace = ?SHUTDOWN_GRACE, "metrics server did not drain in time, forcing shutdown");
                Ok(())
            }
        }
    }
}
