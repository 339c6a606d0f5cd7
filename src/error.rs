//! Error types for reconfy.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for reconfy operations.
pub type Result<T> = std::result::Result<T, ReloadError>;

/// Pipeline stage a reconciliation error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading inputs and expanding variables.
    Render,
    /// Writing the rendered output.
    Write,
    /// Calling the webhook.
    Notify,
}

impl Stage {
    /// Lower case stage name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Write => "write",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while configuring or running reloaders.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// A reloader specification violates one or more invariants.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    /// An input path is missing, unreadable or not a regular file.
    #[error("invalid input {}: {reason}", path.display())]
    InvalidInput {
        /// The offending input path
        path: PathBuf,
        /// Why the input was rejected
        reason: String,
    },

    /// A referenced environment variable is not set.
    #[error("environment variable {name} is not set")]
    MissingVariable {
        /// Name of the unset variable
        name: String,
    },

    /// A `${` reference could not be parsed.
    #[error("bad substitution at byte {offset}: {reason}")]
    BadSubstitution {
        /// Byte offset of the `$` that starts the reference
        offset: usize,
        /// What was wrong with it
        reason: String,
    },

    /// The rendered output could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        /// Destination path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The webhook call failed or returned a non-200 status.
    #[error("webhook {url} failed: {reason}")]
    NotificationFailure {
        /// Webhook URL
        url: String,
        /// Transport error or unexpected status
        reason: String,
    },

    /// The filesystem event subscription could not be set up or died.
    #[error("file watching error: {0}")]
    Subscription(String),

    /// Failed to load configuration from a source.
    #[error("failed to load configuration: {0}")]
    Load(String),

    /// Failed to deserialize configuration.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(String),

    /// Attempted to use a feature that is not enabled.
    #[error("feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),

    /// Metrics recorder or endpoint error.
    #[error("metrics error: {0}")]
    Metrics(String),

    /// A supervised task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("{0}")]
    Other(String),
}

impl ReloadError {
    /// Pipeline stage for per-reconciliation errors, `None` for everything else.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidInput { .. } | Self::MissingVariable { .. } | Self::BadSubstitution { .. } => {
                Some(Stage::Render)
            }
            Self::WriteFailure { .. } => Some(Stage::Write),
            Self::NotificationFailure { .. } => Some(Stage::Notify),
            _ => None,
        }
    }
}

/// Validation error for reloader specifications.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Two reloaders share a name.
    DuplicateName(String),

    /// A path of one reloader feeds back into another (or the same) reloader.
    Collision {
        /// The colliding path
        path: PathBuf,
        /// What it collides with
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a path collision error.
    pub fn collision(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Collision {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when alone.
    pub fn from_list(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::DuplicateName(name) => write!(f, "reloader name '{}' already in use", name),
            Self::Collision { path, reason } => {
                write!(f, "circular dependency on {}: {}", path.display(), reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}
