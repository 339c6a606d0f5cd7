//! Runs every configured reloader together and shuts them down together.
//!
//! One actor per reloader, one for the optional metrics endpoint and one for the
//! external shutdown signal are supervised by a [`RunGroup`]: the first actor to stop
//! (a failed reloader, a dead metrics server, or the signal) stops all of them.

#[cfg(feature = "metrics-server")]
mod metrics_server;
mod run_group;

#[cfg(feature = "metrics-server")]
pub use metrics_server::{MetricsServer, SHUTDOWN_GRACE, install_recorder};
pub use run_group::RunGroup;

#[cfg(feature = "metrics-server")]
use crate::core::MetricsConfig;
use crate::core::{ReloaderSpec, Settings, Validate};
use crate::error::Result;
use crate::reloader::Reloader;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
#[cfg(feature = "metrics-server")]
use tokio::sync::watch;
use tracing::info;

/// Owns one [`Reloader`] per configured spec.
///
/// # Examples
///
/// ```rust,no_run
/// use reconfy::prelude::*;
///
/// # async fn example() -> reconfy::error::Result<()> {
/// let settings = Settings::from_file("/etc/reconfy/reloaders.yaml")?;
/// let orchestrator = Orchestrator::new(settings)?;
///
/// orchestrator
///     .run(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    reloaders: Vec<Arc<Reloader>>,
    #[cfg(feature = "metrics-server")]
    metrics: MetricsConfig,
    #[cfg(feature = "metrics-server")]
    exporter: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl Orchestrator {
    /// Validate `settings` and build every reloader.
    ///
    /// When a metrics listen address is configured the Prometheus recorder is
    /// installed first, so every reloader's metrics are exported.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidConfig`](crate::error::ReloadError::InvalidConfig)
    /// for invalid or conflicting specs, and a metrics error if the endpoint is
    /// configured but cannot be set up.
    pub fn new(settings: Settings) -> Result<Self> {
        // Paths are compared after cleaning, so `a/x/../b` and `a/b` collide.
        let specs: Vec<ReloaderSpec> = settings
            .reloaders
            .iter()
            .map(ReloaderSpec::normalized)
            .collect();
        specs.as_slice().validate()?;

        #[cfg(feature = "metrics-server")]
        let exporter = match settings.metrics.listen_addr() {
            Some(_) => Some(install_recorder()?),
            None => None,
        };
        #[cfg(not(feature = "metrics-server"))]
        if settings.metrics.listen_addr().is_some() {
            return Err(crate::error::ReloadError::FeatureNotEnabled("metrics-server"));
        }
        crate::metrics::describe();

        let reloaders = specs
            .into_iter()
            .map(|spec| Reloader::new(spec).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            reloaders,
            #[cfg(feature = "metrics-server")]
            metrics: settings.metrics,
            #[cfg(feature = "metrics-server")]
            exporter,
        })
    }

    /// The managed reloaders, in configuration order.
    pub fn reloaders(&self) -> &[Arc<Reloader>] {
        &self.reloaders
    }

    /// Run until `shutdown` resolves or any reloader fails.
    ///
    /// Every reloader is closed and awaited before this returns.
    ///
    /// # Errors
    ///
    /// Returns the first failure: a reloader's fatal watch error or a metrics server
    /// error. Resolving `shutdown` yields `Ok(())`.
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let mut group = RunGroup::new();

        for reloader in &self.reloaders {
            let watching = Arc::clone(reloader);
            let closing = Arc::clone(reloader);
            group.add(
                reloader.label(),
                async move { watching.watch().await },
                move || closing.close(),
            );
        }

        #[cfg(feature = "metrics-server")]
        if let Some(handle) = self.exporter {
            let server = MetricsServer::bind(&self.metrics, handle).await?;
            let (stop, stopped) = watch::channel(false);
            group.add("metrics", server.serve(stopped), move || {
                stop.send_replace(true);
            });
        }

        let (cancel, cancelled) = oneshot::channel::<()>();
        group.add(
            "signal",
            async move {
                tokio::select! {
                    _ = shutdown => info!("shutdown signal received"),
                    _ = cancelled => {}
                }
                Ok(())
            },
            move || {
                let _ = cancel.send(());
            },
        );

        info!(reloaders = self.reloaders.len(), "starting reloaders");
        let result = group.run().await;
        info!("all reloaders stopped");
        result
    }
}
