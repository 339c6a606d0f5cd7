//! Configuration file source.

use super::ConfigSource;
use crate::error::{ReloadError, Result};
use config::{File, FileFormat};
use std::collections::HashMap;
use std::path::PathBuf;

/// Reads reloader settings from a YAML, TOML or JSON file.
///
/// The format is picked from the file extension:
/// - `.yaml`, `.yml` -> YAML
/// - `.toml` -> TOML
/// - `.json` -> JSON
///
/// # Examples
///
/// ```rust,no_run
/// use reconfy::sources::FileSource;
///
/// let source = FileSource::new("/etc/reconfy/reloaders.yaml");
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
}

impl FileSource {
    /// Create a new file source.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: 100,
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn format(&self) -> Result<FileFormat> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ReloadError::Load(format!(
                    "unable to determine file format for {}",
                    self.path.display()
                ))
            })?;

        match extension.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            other => Err(ReloadError::Load(format!(
                "unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                other
            ))),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        let format = self.format()?;

        if !self.path.is_file() {
            return Err(ReloadError::Load(format!(
                "configuration file not found: {}",
                self.path.display()
            )));
        }

        let path = self.path.to_string_lossy();
        config::Config::builder()
            .add_source(File::new(&path, format).required(true))
            .build()
            .map_err(|e| ReloadError::Load(format!("failed to read {}: {}", path, e)))?
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| ReloadError::Deserialization(format!("failed to parse {}: {}", path, e)))
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_detection() {
        assert_eq!(FileSource::new("r.yaml").format().unwrap(), FileFormat::Yaml);
        assert_eq!(FileSource::new("r.YML").format().unwrap(), FileFormat::Yaml);
        assert_eq!(FileSource::new("r.toml").format().unwrap(), FileFormat::Toml);
        assert_eq!(FileSource::new("r.json").format().unwrap(), FileFormat::Json);
        assert!(FileSource::new("r.txt").format().is_err());
        assert!(FileSource::new("reloaders").format().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reloaders.yaml");
        fs::write(
            &path,
            r#"
input: /templates/app.tmpl
output: /rendered/app.conf
metrics:
  listen: "127.0.0.1:9090"
"#,
        )
        .unwrap();

        let map = FileSource::new(&path).load().unwrap();
        assert_eq!(
            map["input"].clone().into_string().unwrap(),
            "/templates/app.tmpl"
        );
        assert!(map["metrics"].clone().into_table().is_ok());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let source = FileSource::new("/nonexistent/reloaders.yaml");
        assert!(matches!(source.load(), Err(ReloadError::Load(_))));
    }

    #[test]
    fn test_with_priority() {
        let source = FileSource::new("reloaders.yaml").with_priority(200);
        assert_eq!(source.priority(), 200);
        assert!(source.name().contains("reloaders.yaml"));
    }
}
