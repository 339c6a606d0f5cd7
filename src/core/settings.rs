//! Settings schema: the single-reloader and multi-reloader configuration shapes,
//! normalised into a validated list of [`ReloaderSpec`]s.

use crate::core::{ConfigLoader, ReloaderSpec, ReloaderSpecBuilder, Validate};
use crate::error::{ReloadError, Result, ValidationError};
use crate::sources::{EnvSource, FileSource};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment prefix for settings overrides.
pub const ENV_PREFIX: &str = "RECONFY";

/// Separator for nested keys in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

/// Default path the metrics endpoint is served on.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_string()
}

/// Metrics endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    /// HTTP path of the scrape endpoint.
    #[serde(default = "default_metrics_path")]
    pub path: String,
    /// Listen address; the endpoint is disabled when unset or empty.
    #[serde(default)]
    pub listen: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            listen: None,
        }
    }
}

impl MetricsConfig {
    /// Listen address if the endpoint is enabled.
    pub fn listen_addr(&self) -> Option<&str> {
        self.listen.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Settings shared by every reloader in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BaseConfig {
    /// Metrics endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Expand unset variables to the empty string.
    #[serde(default)]
    pub ignoremissing: bool,
}

/// One or many input paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InputPaths {
    /// A single input.
    One(PathBuf),
    /// Several inputs rendered into one output, in order.
    Many(Vec<PathBuf>),
}

impl Default for InputPaths {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl InputPaths {
    fn into_vec(self) -> Vec<PathBuf> {
        match self {
            Self::One(path) => vec![path],
            Self::Many(paths) => paths,
        }
    }
}

/// Webhook as a bare URL or a URL with a method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WebhookConfig {
    /// URL called with the default method.
    Url(String),
    /// URL and explicit method.
    Detailed {
        /// Endpoint to call
        url: String,
        /// HTTP method
        #[serde(default)]
        method: Option<String>,
    },
}

/// Output permission bits, written as octal digits (`"0640"` or `640`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FileModeConfig {
    /// Digits read as octal, so `644` means `0o644`.
    Digits(u32),
    /// Octal string, with or without a leading `0` / `0o`.
    Octal(String),
}

impl FileModeConfig {
    /// Resolve to permission bits.
    pub fn bits(&self) -> std::result::Result<u32, ValidationError> {
        let digits = match self {
            Self::Digits(n) => n.to_string(),
            Self::Octal(s) => s.trim().trim_start_matches("0o").to_string(),
        };
        u32::from_str_radix(&digits, 8).map_err(|e| {
            ValidationError::invalid_field("filemode", format!("'{}' is not octal: {}", digits, e))
        })
    }
}

/// One reloader as it appears in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReloaderConfig {
    /// Reloader name.
    #[serde(default)]
    pub name: String,
    /// Input template(s).
    #[serde(default)]
    pub input: InputPaths,
    /// Rendered output path.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Webhook target.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    /// Extra directories to watch.
    #[serde(default)]
    pub watchdirs: Vec<PathBuf>,
    /// Output permission bits.
    #[serde(default)]
    pub filemode: Option<FileModeConfig>,
    /// Watch input files instead of their directories.
    #[serde(default)]
    pub watchfileonly: bool,
}

impl ReloaderConfig {
    /// Turn this entry into a validated spec, applying the shared base settings.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidConfig`] if the entry violates any invariant.
    pub fn into_spec(self, base: &BaseConfig) -> Result<ReloaderSpec> {
        let mut builder = ReloaderSpecBuilder::new()
            .with_name(self.name)
            .ignore_missing(base.ignoremissing)
            .watch_file_only(self.watchfileonly);

        for input in self.input.into_vec() {
            builder = builder.with_input(input);
        }
        if let Some(output) = self.output.filter(|o| !o.as_os_str().is_empty()) {
            builder = builder.with_output(output);
        }
        match self.webhook {
            Some(WebhookConfig::Url(url)) => builder = builder.with_webhook(url),
            Some(WebhookConfig::Detailed { url, method }) => {
                builder = builder.with_webhook(url);
                if let Some(method) = method {
                    builder = builder.with_webhook_method(method);
                }
            }
            None => {}
        }
        for dir in self.watchdirs {
            builder = builder.with_watch_dir(dir);
        }
        if let Some(mode) = self.filemode {
            builder = builder.with_file_mode(mode.bits()?);
        }

        builder.build()
    }
}

#[derive(Deserialize)]
struct MultipleReloaderConfig {
    reloaders: Vec<ReloaderConfig>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Validated reloader specifications.
    pub reloaders: Vec<ReloaderSpec>,
    /// Metrics endpoint.
    pub metrics: MetricsConfig,
}

impl Settings {
    /// Load settings from a configuration file, overlaid with `RECONFY_` environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not match either schema, or
    /// the resulting reloaders fail validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = ConfigLoader::new();
        loader.add_source(Box::new(FileSource::new(path.as_ref())));
        loader.add_source(Box::new(EnvSource::new(ENV_PREFIX, ENV_SEPARATOR)));
        Self::from_config(loader.build()?)
    }

    /// Interpret merged configuration as either the multi-reloader form (a
    /// `reloaders` list) or the single-reloader form.
    ///
    /// # Errors
    ///
    /// Returns an error if neither form matches or validation fails.
    pub fn from_config(config: config::Config) -> Result<Self> {
        let base: BaseConfig = config
            .clone()
            .try_deserialize()
            .map_err(|e| ReloadError::Deserialization(e.to_string()))?;

        let entries = if config.get_array("reloaders").is_ok() {
            config
                .try_deserialize::<MultipleReloaderConfig>()
                .map_err(|e| ReloadError::Deserialization(format!("reloaders: {}", e)))?
                .reloaders
        } else {
            vec![
                config
                    .try_deserialize::<ReloaderConfig>()
                    .map_err(|e| ReloadError::Deserialization(e.to_string()))?,
            ]
        };

        Self::from_entries(entries, base)
    }

    /// Build settings for a single reloader.
    ///
    /// # Errors
    ///
    /// Returns an error if the reloader fails validation.
    pub fn single(reloader: ReloaderConfig, base: BaseConfig) -> Result<Self> {
        Self::from_entries(vec![reloader], base)
    }

    /// Build settings from configuration entries, validating each one and then the
    /// set as a whole.
    ///
    /// # Errors
    ///
    /// Returns the first invalid entry's error, or the cross-reloader violations.
    pub fn from_entries(entries: Vec<ReloaderConfig>, base: BaseConfig) -> Result<Self> {
        if entries.is_empty() {
            return Err(ValidationError::custom("no reloaders configured").into());
        }

        let reloaders = entries
            .into_iter()
            .map(|entry| entry.into_spec(&base))
            .collect::<Result<Vec<_>>>()?;
        reloaders.as_slice().validate()?;

        Ok(Self {
            reloaders,
            metrics: base.metrics,
        })
    }
}
