//! Reloader specifications and the settings they are loaded from.

mod builder;
mod loader;
mod settings;
pub(crate) mod spec;
mod validation;

pub use builder::ReloaderSpecBuilder;
pub use loader::ConfigLoader;
pub use settings::{
    BaseConfig, DEFAULT_METRICS_PATH, ENV_PREFIX, ENV_SEPARATOR, FileModeConfig, InputPaths,
    MetricsConfig, ReloaderConfig, Settings, WebhookConfig,
};
pub use spec::{DEFAULT_FILE_MODE, DEFAULT_WEBHOOK_METHOD, ReloaderSpec, Webhook, clean_path};
pub use validation::Validate;
