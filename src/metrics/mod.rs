//! Reloader metrics on top of the `metrics` facade.
//!
//! Every reloader records into its own label-scoped set of handles:
//! - `reloader_reloads_total` / `reloader_reloads_failures_total`: webhook calls
//! - `reloader_config_apply_operations_total` /
//!   `reloader_config_apply_operations_failed_total`: render and write operations
//! - `reloader_watch_events_total` / `reloader_watch_errors_total`
//! - `reloader_watches`
//! - `reloader_last_reload_successful` / `reloader_last_reload_success_timestamp_seconds`
//! - `reloader_reconcile_duration_seconds`
//!
//! Nothing is exported unless a recorder is installed, for example by the
//! orchestrator's metrics server.

mod reloader_metrics;

pub use reloader_metrics::{RELOADER_LABEL, ReloaderMetrics, describe};
