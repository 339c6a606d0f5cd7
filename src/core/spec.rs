//! Reloader specification: the immutable description of one watch pipeline.

use crate::core::Validate;
use crate::error::ValidationError;
use reqwest::{Method, Url};
use std::path::{Component, Path, PathBuf};

/// Default permission bits for rendered output files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default HTTP method for webhook calls.
pub const DEFAULT_WEBHOOK_METHOD: Method = Method::POST;

/// Notification target called after every successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    /// Endpoint to call.
    pub url: Url,
    /// HTTP method, POST unless configured otherwise.
    pub method: Method,
}

impl Webhook {
    /// Create a webhook target using the default method.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: DEFAULT_WEBHOOK_METHOD,
        }
    }

    /// Override the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Everything one reloader needs to know.
///
/// Built once from configuration (usually through
/// [`ReloaderSpecBuilder`](crate::core::ReloaderSpecBuilder)) and owned by exactly
/// one [`Reloader`](crate::reloader::Reloader) afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloaderSpec {
    /// Unique name within one orchestration run. May be empty.
    pub name: String,
    /// Template files to watch and render, in output order.
    pub inputs: Vec<PathBuf>,
    /// Rendered output file.
    pub output: Option<PathBuf>,
    /// Webhook called after each reconciliation.
    pub webhook: Option<Webhook>,
    /// Extra directories whose contents trigger a reconciliation.
    pub watch_dirs: Vec<PathBuf>,
    /// Permission bits for the output file.
    pub file_mode: u32,
    /// Expand unset variables to the empty string instead of failing.
    pub ignore_missing: bool,
    /// Watch the input files themselves rather than their parent directories.
    pub watch_file_only: bool,
}

impl ReloaderSpec {
    /// Label used for logging and metrics: the name, or the first input when unnamed.
    pub fn label(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        self.inputs
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    /// Return a copy with every path lexically cleaned.
    pub fn normalized(&self) -> Self {
        Self {
            inputs: self.inputs.iter().map(|p| clean_path(p)).collect(),
            output: self.output.as_deref().map(clean_path),
            watch_dirs: self.watch_dirs.iter().map(|p| clean_path(p)).collect(),
            ..self.clone()
        }
    }

    /// Directory the output is written into.
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output.as_deref().map(parent_dir)
    }
}

impl Validate for ReloaderSpec {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.inputs.is_empty() {
            errors.push(ValidationError::invalid_field("input", "at least one input is required"));
        }
        for input in &self.inputs {
            if input.as_os_str().is_empty() {
                errors.push(ValidationError::invalid_field("input", "input path must not be empty"));
            }
        }

        if self.output.is_none() && self.webhook.is_none() {
            errors.push(ValidationError::custom(
                "a valid webhook url or an output path (or both) must be provided",
            ));
        }

        if let Some(output) = &self.output {
            if self.inputs.contains(output) {
                errors.push(ValidationError::collision(
                    output,
                    "path is both an input and the output",
                ));
            }

            let output_dir = parent_dir(output);
            for dir in &self.watch_dirs {
                if *dir == output_dir {
                    errors.push(ValidationError::collision(
                        dir,
                        format!("watched directory holds the output {}", output.display()),
                    ));
                }
            }
        }

        if self.file_mode > 0o7777 {
            errors.push(ValidationError::invalid_field(
                "filemode",
                format!("{:o} is not a valid permission mode", self.file_mode),
            ));
        }

        match ValidationError::from_list(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Lexically clean a path: drop `.` components and resolve `..` against preceding
/// components without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    cleaned.pop();
                    depth -= 1;
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Normal(part) => {
                cleaned.push(part);
                depth += 1;
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Parent directory of `path`, `.` for bare file names.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
