//! The reconciliation pipeline: expand the inputs, write the output, call the webhook.
//!
//! [`Reconciler`] runs one pass at a time per trigger; passes for different inputs of
//! the same reloader may overlap. Each pass is contained: failures are logged, counted
//! and published through [`ReconcileStatus`], never propagated to the watch loop.

mod substitute;
mod webhook;
mod writer;

pub use substitute::Substituter;
pub use webhook::{Notifier, WEBHOOK_TIMEOUT};
pub use writer::AtomicWriter;

use crate::core::ReloaderSpec;
use crate::error::{ReloadError, Result, Stage};
use crate::metrics::ReloaderMetrics;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why the last failed pass failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    /// Stage the pass stopped at.
    pub stage: Option<Stage>,
    /// Rendered error message.
    pub message: String,
}

/// Running totals for one reloader's reconciliation passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStatus {
    /// Passes run so far, successful or not.
    pub passes: u64,
    /// Passes that failed.
    pub failures: u64,
    /// Failure of the most recent pass; cleared by a successful one.
    pub last_failure: Option<ReconcileFailure>,
}

impl ReconcileStatus {
    /// Whether the most recent pass succeeded. `false` before the first pass.
    pub fn last_succeeded(&self) -> bool {
        self.passes > 0 && self.last_failure.is_none()
    }
}

/// Executes the substitution, write and notification steps for one reloader.
pub struct Reconciler {
    label: String,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    substituter: Substituter,
    writer: AtomicWriter,
    notifier: Notifier,
    metrics: ReloaderMetrics,
    status: ArcSwap<ReconcileStatus>,
}

impl Reconciler {
    /// Build the pipeline for `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook client cannot be constructed.
    pub fn new(spec: &ReloaderSpec, metrics: ReloaderMetrics) -> Result<Self> {
        Ok(Self {
            label: spec.label(),
            inputs: spec.inputs.clone(),
            output: spec.output.clone(),
            substituter: Substituter::new(spec.ignore_missing),
            writer: AtomicWriter::new(spec.file_mode),
            notifier: Notifier::new(spec.webhook.clone())?,
            metrics,
            status: ArcSwap::from_pointee(ReconcileStatus::default()),
        })
    }

    /// Latest status snapshot.
    pub fn status(&self) -> Arc<ReconcileStatus> {
        self.status.load_full()
    }

    /// Metric handles this pipeline records into.
    pub fn metrics(&self) -> &ReloaderMetrics {
        &self.metrics
    }

    /// Render every input, in order, into one buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidInput`] if an input cannot be read, or the
    /// substitution error for the first input that fails to expand.
    pub async fn render(&self) -> Result<Vec<u8>> {
        let mut rendered = Vec::new();
        for input in &self.inputs {
            let raw = tokio::fs::read(input)
                .await
                .map_err(|e| ReloadError::InvalidInput {
                    path: input.clone(),
                    reason: e.to_string(),
                })?;
            rendered.extend(self.substituter.expand(&raw)?);
        }
        Ok(rendered)
    }

    /// Run the pipeline once and return its outcome.
    ///
    /// Without an output only the webhook is called. A render or write failure skips
    /// the webhook.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn reconcile(&self) -> Result<()> {
        if let Some(output) = &self.output {
            let applied = self.apply(output.clone()).await;
            self.metrics.record_apply(applied.is_ok());
            applied?;
            debug!(reloader = %self.label, output = %output.display(), "output written");
        }

        if let Some(webhook) = self.notifier.target() {
            let notified = self.notifier.notify().await;
            self.metrics.record_reload(notified.is_ok());
            notified?;
            debug!(
                reloader = %self.label,
                webhook_url = %webhook.url,
                webhook_method = %webhook.method,
                "webhook notified"
            );
        }

        Ok(())
    }

    async fn apply(&self, output: PathBuf) -> Result<()> {
        let data = self.render().await?;
        let writer = self.writer;
        tokio::task::spawn_blocking(move || writer.write(&output, &data))
            .await
            .map_err(|e| ReloadError::Task(format!("output writer: {}", e)))?
    }

    /// Run one contained pass: log, count and publish the outcome.
    ///
    /// Returns whether the pass succeeded.
    pub async fn run_pass(&self, trigger: &str) -> bool {
        let started = Instant::now();
        let outcome = self.reconcile().await;
        let elapsed = started.elapsed();
        self.metrics.record_pass(outcome.is_ok(), elapsed);

        let failure = match &outcome {
            Ok(()) => {
                info!(
                    reloader = %self.label,
                    trigger,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "reconciled"
                );
                None
            }
            Err(e) => {
                let stage = e.stage();
                warn!(
                    reloader = %self.label,
                    trigger,
                    stage = stage.map_or("other", |s| s.as_str()),
                    error = %e,
                    "reconciliation failed"
                );
                Some(ReconcileFailure {
                    stage,
                    message: e.to_string(),
                })
            }
        };

        self.status.rcu(|current| ReconcileStatus {
            passes: current.passes + 1,
            failures: current.failures + u64::from(failure.is_some()),
            last_failure: failure.clone(),
        });

        outcome.is_ok()
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("label", &self.label)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("webhook", &self.notifier.target())
            .finish_non_exhaustive()
    }
}
