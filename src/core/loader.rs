//! Configuration loader that merges multiple sources.

use crate::error::{ReloadError, Result};
use crate::sources::ConfigSource;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// Loads and merges reloader settings from multiple sources.
///
/// Sources are applied lowest priority first. Nested tables are flattened into dotted
/// keys before merging, so an override of `metrics.listen` keeps `metrics.path` from a
/// lower priority source.
pub struct ConfigLoader {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a configuration source.
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        self.sources.push(source);
    }

    /// Merge every source into a single `config::Config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no source was added or any source fails to load.
    pub fn build(&self) -> Result<config::Config> {
        if self.sources.is_empty() {
            return Err(ReloadError::Load(
                "no configuration sources specified".to_string(),
            ));
        }

        let mut builder = config::Config::builder();

        for source in self.sorted() {
            let values = source.load().map_err(|e| {
                ReloadError::Load(format!("failed to load source '{}': {}", source.name(), e))
            })?;
            debug!(source = %source.name(), keys = values.len(), "merging configuration source");

            let mut flat = Vec::new();
            for (key, value) in values {
                flatten(key, value, &mut flat);
            }

            for (key, value) in flat {
                builder = builder.set_override(&key, value).map_err(|e| {
                    ReloadError::Load(format!(
                        "failed to merge source '{}': {}",
                        source.name(),
                        e
                    ))
                })?;
            }
        }

        builder
            .build()
            .map_err(|e| ReloadError::Load(format!("failed to build configuration: {}", e)))
    }

    /// Merge every source and deserialize the result.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the merged values do not fit `T`.
    pub fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.build()?.try_deserialize::<T>().map_err(|e| {
            ReloadError::Deserialization(format!("failed to deserialize configuration: {}", e))
        })
    }

    /// Source names in the order they are applied.
    pub fn source_names(&self) -> Vec<String> {
        self.sorted().iter().map(|s| s.name()).collect()
    }

    fn sorted(&self) -> Vec<&dyn ConfigSource> {
        let mut sorted: Vec<&dyn ConfigSource> = self.sources.iter().map(|s| s.as_ref()).collect();
        sorted.sort_by_key(|s| s.priority());
        sorted
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten(key: String, value: config::Value, out: &mut Vec<(String, config::Value)>) {
    match value.kind {
        config::ValueKind::Table(table) if !table.is_empty() => {
            let nested: HashMap<String, config::Value> = table.into_iter().collect();
            for (child, value) in nested {
                flatten(format!("{}.{}", key, child), value, out);
            }
        }
        kind => out.push((key, config::Value::new(None, kind))),
    }
}
