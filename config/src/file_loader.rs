//! # Configuration File Source
//!
//! Loads TOML or YAML files into a flat, read-only key space.
//!
//! Supports automatic format detection based on file extension. Nested
//! tables become dot-separated keys (`[db] host = "x"` -> `db.host`) and
//! arrays are joined with `,`.

use crate::source::ConfigSource;
use errors::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Yaml
}

impl FileFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::backend(path.display().to_string(), "config file has no extension"))?;

        match extension.to_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(ConfigError::backend(
                path.display().to_string(),
                format!("unsupported config file format: {other}")
            ))
        }
    }
}

/// Immutable snapshot of a configuration file.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    entries: BTreeMap<String, String>
}

impl FileSource {
    /// Load `path`, detecting its format from the extension.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Usage
    /// ```rust,no_run
    /// use config::{ConfigSource, FileSource};
    /// use std::path::Path;
    ///
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let source = FileSource::load(Path::new("app.toml"))?;
    ///     println!("db.host = {:?}", source.get_raw("db.host")?);
    ///     Ok(())
    /// }
    /// ```
    ///
    /// ## Error Handling
    /// Returns `ConfigError::Backend` for unreadable files, missing or
    /// unsupported extensions and syntax errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = FileFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::backend(path.display().to_string(), e))?;
        let source = Self::parse(path, &contents, format)?;
        debug!("Loaded {} keys from {:?}", source.entries.len(), path);
        Ok(source)
    }

    /// Parse `contents` as if read from `path`.
    pub fn parse(path: &Path, contents: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let name = path.display().to_string();
        let mut entries = BTreeMap::new();

        match format {
            FileFormat::Toml => {
                let table: toml::Table = toml::from_str(contents)
                    .map_err(|e| ConfigError::backend(&name, format!("failed to parse TOML: {e}")))?;
                for (key, value) in table {
                    flatten_toml(&key, value, &mut entries);
                }
            }
            FileFormat::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_str(contents)
                    .map_err(|e| ConfigError::backend(&name, format!("failed to parse YAML: {e}")))?;
                flatten_yaml("", value, &mut entries);
            }
        }

        Ok(Self {
            name,
            path: path.to_path_buf(),
            entries
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn flatten_toml(key: &str, value: toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (child, value) in table {
                flatten_toml(&join_key(key, &child), value, out);
            }
        }
        toml::Value::Array(items) => {
            let joined = items
                .into_iter()
                .map(toml_scalar)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(key.to_string(), joined);
        }
        scalar => {
            out.insert(key.to_string(), toml_scalar(scalar));
        }
    }
}

fn toml_scalar(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        other => other.to_string()
    }
}

fn flatten_yaml(key: &str, value: serde_yaml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(mapping) => {
            for (child, value) in mapping {
                let Some(child) = yaml_scalar(child) else {
                    continue;
                };
                flatten_yaml(&join_key(key, &child), value, out);
            }
        }
        serde_yaml::Value::Sequence(items) => {
            let joined = items
                .into_iter()
                .filter_map(yaml_scalar)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(key.to_string(), joined);
        }
        serde_yaml::Value::Tagged(tagged) => flatten_yaml(key, tagged.value, out),
        scalar => {
            if let Some(text) = yaml_scalar(scalar) {
                out.insert(key.to_string(), text);
            }
        }
    }
}

fn yaml_scalar(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Tagged(tagged) => yaml_scalar(tagged.value),
        _ => None
    }
}

impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(self.entries.contains_key(key))
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.entries.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.entries.keys().cloned().collect())
    }
}
