//! Environment variable configuration source.

use super::ConfigSource;
use crate::error::{ReloadError, Result};
use config::Environment;
use std::collections::HashMap;

/// Keys whose environment values are comma separated lists.
const LIST_KEYS: &[&str] = &["input", "watchdirs"];

/// Overrides settings from prefixed environment variables.
///
/// The prefix is joined to the key with `_`, nested keys use the configured separator:
///
/// ```rust
/// use reconfy::sources::EnvSource;
///
/// // RECONFY_IGNOREMISSING=true     -> ignoremissing = true
/// // RECONFY_METRICS__LISTEN=:9090  -> metrics.listen = ":9090"
/// // RECONFY_WATCHDIRS=/a,/b        -> watchdirs = ["/a", "/b"]
/// let source = EnvSource::new("RECONFY", "__");
/// ```
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
}

impl EnvSource {
    /// Create a new environment variable source.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 300,
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn environment(&self) -> Environment {
        let mut env = Environment::with_prefix(&self.prefix)
            .prefix_separator("_")
            .separator(&self.separator)
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }
        env
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        config::Config::builder()
            .add_source(self.environment())
            .build()
            .map_err(|e| ReloadError::Load(format!("failed to read environment: {}", e)))?
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| {
                ReloadError::Deserialization(format!("failed to parse environment: {}", e))
            })
    }

    fn name(&self) -> String {
        format!("env:{}_*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
#[allow(unsafe_code)] // For env var manipulation in tests
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_env_source_creation() {
        let source = EnvSource::new("RECONFY", "__");
        assert_eq!(source.prefix, "RECONFY");
        assert_eq!(source.separator, "__");
        assert_eq!(source.priority(), 300);
        assert_eq!(source.name(), "env:RECONFY_*");
    }

    #[test]
    fn test_with_priority() {
        let source = EnvSource::new("RECONFY", "__").with_priority(400);
        assert_eq!(source.priority(), 400);
    }

    #[test]
    fn test_load_prefixed_values() {
        unsafe {
            env::set_var("RECONFY_ENVSRC_TEST_IGNOREMISSING", "true");
            env::set_var("RECONFY_ENVSRC_TEST_METRICS__LISTEN", "127.0.0.1:9100");
        }

        let map = EnvSource::new("RECONFY_ENVSRC_TEST", "__").load().unwrap();
        assert!(map["ignoremissing"].clone().into_bool().unwrap());

        let metrics = map["metrics"].clone().into_table().unwrap();
        assert_eq!(
            metrics["listen"].clone().into_string().unwrap(),
            "127.0.0.1:9100"
        );

        unsafe {
            env::remove_var("RECONFY_ENVSRC_TEST_IGNOREMISSING");
            env::remove_var("RECONFY_ENVSRC_TEST_METRICS__LISTEN");
        }
    }

    #[test]
    fn test_load_empty() {
        let map = EnvSource::new("RECONFY_ENVSRC_NONEXISTENT", "__").load().unwrap();
        assert!(map.is_empty());
    }
}
