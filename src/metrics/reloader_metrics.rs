//! Per-reloader metric handles.

use metrics::{Counter, Gauge, Histogram, counter, gauge, histogram};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Label every reloader metric carries.
pub const RELOADER_LABEL: &str = "reloader";

const RELOADS: &str = "reloader_reloads_total";
const RELOAD_FAILURES: &str = "reloader_reloads_failures_total";
const APPLY_OPERATIONS: &str = "reloader_config_apply_operations_total";
const APPLY_FAILURES: &str = "reloader_config_apply_operations_failed_total";
const WATCH_EVENTS: &str = "reloader_watch_events_total";
const WATCH_ERRORS: &str = "reloader_watch_errors_total";
const WATCHES: &str = "reloader_watches";
const LAST_RELOAD_SUCCESSFUL: &str = "reloader_last_reload_successful";
const LAST_RELOAD_SUCCESS_TIMESTAMP: &str = "reloader_last_reload_success_timestamp_seconds";
const RECONCILE_DURATION: &str = "reloader_reconcile_duration_seconds";

/// Register descriptions for every reloader metric with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(RELOADS, "Total number of webhook calls.");
    metrics::describe_counter!(RELOAD_FAILURES, "Total number of failed webhook calls.");
    metrics::describe_counter!(
        APPLY_OPERATIONS,
        "Total number of render and write operations."
    );
    metrics::describe_counter!(
        APPLY_FAILURES,
        "Total number of render and write operations that failed."
    );
    metrics::describe_counter!(WATCH_EVENTS, "Total number of filesystem events received.");
    metrics::describe_counter!(WATCH_ERRORS, "Total number of filesystem watch errors.");
    metrics::describe_gauge!(WATCHES, "Number of paths being watched.");
    metrics::describe_gauge!(
        LAST_RELOAD_SUCCESSFUL,
        "Whether the last reconciliation succeeded (1) or failed (0)."
    );
    metrics::describe_gauge!(
        LAST_RELOAD_SUCCESS_TIMESTAMP,
        "Unix time of the last successful reconciliation."
    );
    metrics::describe_histogram!(
        RECONCILE_DURATION,
        metrics::Unit::Seconds,
        "Duration of reconciliation passes."
    );
}

/// Metric handles scoped to one reloader.
///
/// Handles bind to whichever recorder is installed when this is created, so the
/// exporter must be installed first. With no recorder every update is a no-op.
///
/// # Examples
///
/// ```rust
/// use reconfy::metrics::ReloaderMetrics;
///
/// let metrics = ReloaderMetrics::new("nginx");
/// metrics.record_watch_event();
/// metrics.record_apply(true);
/// metrics.record_reload(true);
/// ```
#[derive(Clone)]
pub struct ReloaderMetrics {
    label: String,
    reloads: Counter,
    reload_failures: Counter,
    apply_operations: Counter,
    apply_failures: Counter,
    watch_events: Counter,
    watch_errors: Counter,
    watches: Gauge,
    last_reload_successful: Gauge,
    last_reload_success_timestamp: Gauge,
    reconcile_duration: Histogram,
}

impl ReloaderMetrics {
    /// Create handles labelled with `reloader=<label>`.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let labels = [(RELOADER_LABEL, label.clone())];

        Self {
            reloads: counter!(RELOADS, &labels),
            reload_failures: counter!(RELOAD_FAILURES, &labels),
            apply_operations: counter!(APPLY_OPERATIONS, &labels),
            apply_failures: counter!(APPLY_FAILURES, &labels),
            watch_events: counter!(WATCH_EVENTS, &labels),
            watch_errors: counter!(WATCH_ERRORS, &labels),
            watches: gauge!(WATCHES, &labels),
            last_reload_successful: gauge!(LAST_RELOAD_SUCCESSFUL, &labels),
            last_reload_success_timestamp: gauge!(LAST_RELOAD_SUCCESS_TIMESTAMP, &labels),
            reconcile_duration: histogram!(RECONCILE_DURATION, &labels),
            label,
        }
    }

    /// Value of the `reloader` label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Count a filesystem event.
    pub fn record_watch_event(&self) {
        self.watch_events.increment(1);
    }

    /// Count a filesystem watch error.
    pub fn record_watch_error(&self) {
        self.watch_errors.increment(1);
    }

    /// Set the number of registered watches.
    pub fn set_watches(&self, count: usize) {
        self.watches.set(count as f64);
    }

    /// Count a render and write operation.
    pub fn record_apply(&self, success: bool) {
        self.apply_operations.increment(1);
        if !success {
            self.apply_failures.increment(1);
        }
    }

    /// Count a webhook call.
    pub fn record_reload(&self, success: bool) {
        self.reloads.increment(1);
        if !success {
            self.reload_failures.increment(1);
        }
    }

    /// Record the outcome and duration of a whole reconciliation pass.
    pub fn record_pass(&self, success: bool, elapsed: Duration) {
        self.reconcile_duration.record(elapsed.as_secs_f64());
        if success {
            self.last_reload_successful.set(1.0);
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            self.last_reload_success_timestamp.set(now.as_secs_f64());
        } else {
            self.last_reload_successful.set(0.0);
        }
    }
}

impl std::fmt::Debug for ReloaderMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloaderMetrics")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
