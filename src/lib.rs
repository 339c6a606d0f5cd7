//! # reconfy
//!
//! Render configuration templates from environment variables and keep the rendered
//! files up to date.
//!
//! ## Overview
//!
//! A reloader watches one or more template files. Whenever a template (or a file in an
//! extra watch directory) changes, it:
//! - expands `$VAR`, `${VAR}` and `${VAR:-default}` references from the environment
//! - atomically replaces the output file with the result
//! - calls an optional webhook so the consuming process can reload
//!
//! Bursts of events on the same file are debounced, and a failed pass never stops the
//! reloader: the next change simply tries again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reconfy::prelude::*;
//!
//! # async fn example() -> reconfy::error::Result<()> {
//! let spec = ReloaderSpec::builder("/etc/prometheus/prometheus.yml.tmpl")
//!     .with_name("prometheus")
//!     .with_output("/etc/prometheus/prometheus.yml")
//!     .with_webhook("http://localhost:9090/-/reload")
//!     .build()?;
//!
//! let reloader = Reloader::new(spec)?;
//! reloader.watch().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Several reloaders sharing one metrics endpoint are run by an [`Orchestrator`]:
//!
//! ```rust,no_run
//! use reconfy::prelude::*;
//!
//! # async fn example() -> reconfy::error::Result<()> {
//! let settings = Settings::from_file("reloaders.yaml")?;
//! Orchestrator::new(settings)?
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics-server` (default): serve Prometheus metrics over HTTP
//!
//! [`Orchestrator`]: orchestrator::Orchestrator

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod reconcile;
pub mod reloader;
pub mod sources;
pub mod watch;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ReloaderSpec, ReloaderSpecBuilder, Settings, Validate};
    pub use crate::error::{ReloadError, Result, ValidationError};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::reloader::Reloader;
    pub use crate::watch::WatchState;
}
