//! Builder for constructing validated `ReloaderSpec` instances.

use crate::core::spec::{DEFAULT_FILE_MODE, DEFAULT_WEBHOOK_METHOD};
use crate::core::{ReloaderSpec, Validate, Webhook};
use crate::error::{Result, ValidationError};
use reqwest::{Method, Url};
use std::path::PathBuf;

/// Builder for constructing a [`ReloaderSpec`].
///
/// Collects raw values (URLs and methods as strings, paths as given) and validates
/// everything once in [`build`](Self::build).
///
/// # Examples
///
/// ```rust
/// use reconfy::core::ReloaderSpec;
///
/// # fn example() -> reconfy::error::Result<()> {
/// let spec = ReloaderSpec::builder("templates/app.conf.tmpl")
///     .with_name("app")
///     .with_output("rendered/app.conf")
///     .with_webhook("http://localhost:8080/-/reload")
///     .with_file_mode(0o600)
///     .build()?;
///
/// assert_eq!(spec.label(), "app");
/// # Ok(())
/// # }
/// ```
pub struct ReloaderSpecBuilder {
    name: String,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    webhook_url: Option<String>,
    webhook_method: Option<String>,
    watch_dirs: Vec<PathBuf>,
    file_mode: u32,
    ignore_missing: bool,
    watch_file_only: bool,
}

impl ReloaderSpecBuilder {
    /// Create a new builder with no inputs and default settings.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            inputs: Vec::new(),
            output: None,
            webhook_url: None,
            webhook_method: None,
            watch_dirs: Vec::new(),
            file_mode: DEFAULT_FILE_MODE,
            ignore_missing: false,
            watch_file_only: false,
        }
    }

    /// Set the reloader name used for logging, metrics and uniqueness checks.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an input template.
    ///
    /// Inputs are rendered in the order they are added.
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Set the rendered output path.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the webhook URL. An empty string leaves the webhook disabled.
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.webhook_url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    /// Set the webhook HTTP method (case-insensitive, POST by default).
    pub fn with_webhook_method(mut self, method: impl Into<String>) -> Self {
        self.webhook_method = Some(method.into());
        self
    }

    /// Add an extra directory whose contents trigger reconciliation.
    pub fn with_watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watch_dirs.push(dir.into());
        self
    }

    /// Set the permission bits of the output file.
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Expand unset variables to the empty string instead of failing.
    pub fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }

    /// Watch the input files themselves instead of their parent directories.
    pub fn watch_file_only(mut self, file_only: bool) -> Self {
        self.watch_file_only = file_only;
        self
    }

    /// Build the specification.
    ///
    /// Paths are lexically cleaned, the webhook URL and method parsed, and every
    /// invariant checked.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::InvalidConfig`](crate::error::ReloadError::InvalidConfig)
    /// listing every violated invariant.
    pub fn build(self) -> Result<ReloaderSpec> {
        let mut errors = Vec::new();

        let method = match &self.webhook_method {
            None => DEFAULT_WEBHOOK_METHOD,
            Some(raw) => match Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes()) {
                Ok(method) => method,
                Err(e) => {
                    errors.push(ValidationError::invalid_field("webhook.method", e.to_string()));
                    DEFAULT_WEBHOOK_METHOD
                }
            },
        };

        let webhook = match &self.webhook_url {
            None => None,
            Some(raw) => match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    Some(Webhook::new(url).with_method(method))
                }
                Ok(url) => {
                    errors.push(ValidationError::invalid_field(
                        "webhook",
                        format!("unsupported scheme '{}'", url.scheme()),
                    ));
                    None
                }
                Err(e) => {
                    errors.push(ValidationError::invalid_field(
                        "webhook",
                        format!("error with webhook url {}: {}", raw, e),
                    ));
                    None
                }
            },
        };

        let spec = ReloaderSpec {
            name: self.name,
            inputs: self.inputs,
            output: self.output,
            webhook,
            watch_dirs: self.watch_dirs,
            file_mode: self.file_mode,
            ignore_missing: self.ignore_missing,
            watch_file_only: self.watch_file_only,
        }
        .normalized();

        // Skip the "needs output or webhook" check when the URL itself was bad.
        if errors.is_empty() {
            if let Err(err) = spec.validate() {
                errors.push(err);
            }
        }

        match ValidationError::from_list(errors) {
            None => Ok(spec),
            Some(err) => Err(err.into()),
        }
    }
}

impl Default for ReloaderSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloaderSpec {
    /// Create a new builder for a reloader rendering `input`.
    pub fn builder(input: impl Into<PathBuf>) -> ReloaderSpecBuilder {
        ReloaderSpecBuilder::new().with_input(input)
    }
}
