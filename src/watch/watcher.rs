//! The per-reloader watch loop.

use super::{DEBOUNCE_WINDOW, Debouncer, EventFilter};
use crate::core::ReloaderSpec;
use crate::error::{ReloadError, Result};
use crate::reconcile::Reconciler;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the channel between the filesystem watcher and the loop.
const EVENT_BUFFER: usize = 128;

/// Lifecycle of a watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Constructed, not watching yet.
    Idle,
    /// Subscription active and events being processed.
    Running,
    /// Shutdown requested, resources being released.
    Stopping,
    /// Subscription and timers released. Terminal.
    Stopped,
}

impl std::fmt::Display for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Where to subscribe and which paths count as monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchPlan {
    /// Paths registered with the OS watcher.
    pub watches: BTreeSet<PathBuf>,
    /// Input files, with their directories canonicalized.
    pub files: Vec<PathBuf>,
    /// Extra watch directories, canonicalized.
    pub dirs: Vec<PathBuf>,
}

impl WatchPlan {
    /// Resolve the spec's paths against the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidInput`] if an input's directory or a watch
    /// directory cannot be resolved.
    pub fn resolve(spec: &ReloaderSpec) -> Result<Self> {
        let mut watches = BTreeSet::new();
        let mut files = Vec::with_capacity(spec.inputs.len());

        for input in &spec.inputs {
            let file = resolve_input(input)?;
            if spec.watch_file_only {
                watches.insert(file.clone());
            } else if let Some(dir) = file.parent() {
                watches.insert(dir.to_path_buf());
            }
            files.push(file);
        }

        let mut dirs = Vec::with_capacity(spec.watch_dirs.len());
        for dir in &spec.watch_dirs {
            let dir = dir.canonicalize().map_err(|e| ReloadError::InvalidInput {
                path: dir.clone(),
                reason: format!("cannot resolve watch directory: {}", e),
            })?;
            watches.insert(dir.clone());
            dirs.push(dir);
        }

        Ok(Self {
            watches,
            files,
            dirs,
        })
    }
}

/// Canonicalize the directory of `input` and re-attach the file name, so event paths
/// reported for that directory compare equal.
fn resolve_input(input: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| ReloadError::InvalidInput {
        path: input.to_path_buf(),
        reason,
    };

    let name = input
        .file_name()
        .ok_or_else(|| invalid("input has no file name".to_string()))?;
    let parent = match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let dir = parent
        .canonicalize()
        .map_err(|e| invalid(format!("cannot resolve directory: {}", e)))?;
    Ok(dir.join(name))
}

/// Owns the filesystem subscription of one reloader and drives its reconciliations.
///
/// [`run`](Self::run) registers the watches, performs one unconditional reconciliation,
/// then feeds accepted events through the [`Debouncer`] until shutdown is signalled or
/// the subscription dies.
pub struct WatchLoop {
    label: String,
    spec: ReloaderSpec,
    reconciler: Arc<Reconciler>,
}

impl WatchLoop {
    /// Create a loop for `spec` running passes on `reconciler`.
    pub fn new(spec: ReloaderSpec, reconciler: Arc<Reconciler>) -> Self {
        Self {
            label: spec.label(),
            spec,
            reconciler,
        }
    }

    /// Watch until `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// State changes are published on `state`; it always ends at [`WatchState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidInput`] if the watched paths cannot be resolved and
    /// [`ReloadError::Subscription`] if the OS watcher cannot be set up or dies.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        state: &watch::Sender<WatchState>,
    ) -> Result<()> {
        let result = self.run_inner(&mut shutdown, state).await;
        state.send_replace(WatchState::Stopped);
        debug!(reloader = %self.label, "watch loop stopped");
        result
    }

    async fn run_inner(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        state: &watch::Sender<WatchState>,
    ) -> Result<()> {
        let plan = WatchPlan::resolve(&self.spec)?;
        let (tx, mut events) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);

        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            // Runs on the watcher's own thread; fails only once the loop is gone.
            let _ = tx.blocking_send(res);
        })
        .map_err(|e| ReloadError::Subscription(format!("failed to create file watcher: {}", e)))?;

        for path in &plan.watches {
            debug!(reloader = %self.label, path = %path.display(), "adding watch");
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ReloadError::Subscription(format!(
                        "failed to watch {}: {}",
                        path.display(),
                        e
                    ))
                })?;
        }
        self.reconciler.metrics().set_watches(plan.watches.len());

        let mut filter = EventFilter::new(plan.files, plan.dirs).seed_from_disk();
        state.send_replace(WatchState::Running);
        info!(
            reloader = %self.label,
            inputs = ?self.spec.inputs,
            output = ?self.spec.output,
            webhook_url = ?self.spec.webhook.as_ref().map(|w| w.url.as_str()),
            webhook_method = ?self.spec.webhook.as_ref().map(|w| w.method.as_str()),
            watch_file_only = self.spec.watch_file_only,
            "starting watch"
        );

        // Events queue up in the channel until the first pass is done.
        self.reconciler.run_pass("initial").await;

        let debouncer = {
            let reconciler = Arc::clone(&self.reconciler);
            let label = self.label.clone();
            Debouncer::new(DEBOUNCE_WINDOW, move |path: PathBuf| {
                let reconciler = Arc::clone(&reconciler);
                let label = label.clone();
                async move {
                    info!(reloader = %label, path = %path.display(), "change detected");
                    reconciler.run_pass("change").await;
                }
            })
        };

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break Ok(()),
                message = events.recv() => match message {
                    Some(Ok(event)) => {
                        self.reconciler.metrics().record_watch_event();
                        for path in filter.accept(&event) {
                            debug!(
                                reloader = %self.label,
                                path = %path.display(),
                                kind = ?event.kind,
                                "change event"
                            );
                            debouncer.trigger(path);
                        }
                    }
                    Some(Err(e)) => {
                        self.reconciler.metrics().record_watch_error();
                        warn!(reloader = %self.label, error = %e, "error from file watcher");
                    }
                    None => {
                        error!(reloader = %self.label, "file watcher event stream closed");
                        break Err(ReloadError::Subscription(
                            "file watcher event stream closed".to_string(),
                        ));
                    }
                },
            }
        };

        state.send_replace(WatchState::Stopping);
        debouncer.close();
        // Close the channel first so a watcher thread blocked on a full buffer wakes up.
        drop(events);
        drop(watcher);
        self.reconciler.metrics().set_watches(0);
        result
    }
}
