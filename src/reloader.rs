//! A single reloader: one spec, one watch loop.

use crate::core::{ReloaderSpec, Validate};
use crate::error::{ReloadError, Result};
use crate::metrics::ReloaderMetrics;
use crate::reconcile::{ReconcileStatus, Reconciler};
use crate::watch::{WatchLoop, WatchState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, error};

/// Watches one set of templates and keeps their rendered output up to date.
///
/// # Examples
///
/// ```rust,no_run
/// use reconfy::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> reconfy::error::Result<()> {
/// let spec = ReloaderSpec::builder("/etc/templates/app.conf.tmpl")
///     .with_name("app")
///     .with_output("/etc/app/app.conf")
///     .with_webhook("http://localhost:8080/-/reload")
///     .build()?;
///
/// let reloader = Arc::new(Reloader::new(spec)?);
/// let handle = {
///     let reloader = Arc::clone(&reloader);
///     tokio::spawn(async move { reloader.watch().await })
/// };
///
/// // ... later
/// reloader.close();
/// handle.await.unwrap()?;
/// # Ok(())
/// # }
/// ```
pub struct Reloader {
    spec: ReloaderSpec,
    reconciler: Arc<Reconciler>,
    state: watch::Sender<WatchState>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

impl Reloader {
    /// Create a reloader recording metrics under its own label.
    ///
    /// Paths are normalized lexically; the filesystem is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidConfig`] listing every violated invariant.
    pub fn new(spec: ReloaderSpec) -> Result<Self> {
        let metrics = ReloaderMetrics::new(spec.label());
        Self::with_metrics(spec, metrics)
    }

    /// Create a reloader recording into the given metric handles.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_metrics(spec: ReloaderSpec, metrics: ReloaderMetrics) -> Result<Self> {
        let spec = spec.normalized();
        spec.validate()?;

        let reconciler = Arc::new(Reconciler::new(&spec, metrics)?);
        let (state, _) = watch::channel(WatchState::Idle);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            spec,
            reconciler,
            state,
            shutdown,
            started: AtomicBool::new(false),
        })
    }

    /// Watch until [`close`](Self::close) is called or watching fails.
    ///
    /// Every input must exist and be a regular file. One reconciliation runs
    /// immediately; later ones follow filesystem changes. Reconciliation failures are
    /// logged and recorded, never returned. Returns immediately if the reloader was
    /// already closed.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidInput`] for a missing or directory input,
    /// [`ReloadError::Subscription`] if filesystem watching fails, and
    /// [`ReloadError::Other`] if this reloader is already watching.
    pub async fn watch(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ReloadError::Other(format!(
                "reloader '{}' is already watching",
                self.label()
            )));
        }

        let shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            debug!(reloader = %self.label(), "closed before watching");
            self.state.send_replace(WatchState::Stopped);
            return Ok(());
        }

        if let Err(e) = self.check_inputs().await {
            error!(reloader = %self.label(), error = %e, "invalid input");
            self.state.send_replace(WatchState::Stopped);
            return Err(e);
        }

        let result = WatchLoop::new(self.spec.clone(), Arc::clone(&self.reconciler))
            .run(shutdown, &self.state)
            .await;
        if let Err(e) = &result {
            error!(reloader = %self.label(), error = %e, "watch failed");
        }
        result
    }

    async fn check_inputs(&self) -> Result<()> {
        for input in &self.spec.inputs {
            let metadata =
                tokio::fs::metadata(input)
                    .await
                    .map_err(|e| ReloadError::InvalidInput {
                        path: input.clone(),
                        reason: format!("could not stat input file: {}", e),
                    })?;
            if metadata.is_dir() {
                return Err(ReloadError::InvalidInput {
                    path: input.clone(),
                    reason: "is a directory".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Ask the watch loop to stop. Safe to call any number of times, before or during
    /// [`watch`](Self::watch).
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Outcome totals of the reconciliation passes so far.
    pub fn last_reconcile(&self) -> Arc<ReconcileStatus> {
        self.reconciler.status()
    }

    /// Configured name; may be empty.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Name, or the first input when unnamed.
    pub fn label(&self) -> String {
        self.spec.label()
    }

    /// The normalized specification.
    pub fn spec(&self) -> &ReloaderSpec {
        &self.spec
    }
}

impl std::fmt::Debug for Reloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reloader")
            .field("spec", &self.spec)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
