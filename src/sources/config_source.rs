//! Configuration source trait.

use crate::error::Result;
use std::collections::HashMap;

/// A place reloader settings can be read from.
///
/// Sources are merged by [`ConfigLoader`](crate::core::ConfigLoader): each one yields a
/// key-value map and higher priority sources override lower priority ones key by key.
pub trait ConfigSource: Send + Sync {
    /// Load settings as a key-value map. Nested tables are allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed.
    fn load(&self) -> Result<HashMap<String, config::Value>>;

    /// Human-readable name for this source (for logging).
    fn name(&self) -> String;

    /// Priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Environment variables: 300
    /// - Configuration file: 100
    fn priority(&self) -> i32 {
        100
    }
}
