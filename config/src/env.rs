//! # Environment Source
//!
//! Read-only view over process environment variables, following 12-factor
//! app principles.
//!
//! # Naming Convention
//! Key `db.pool-size` with prefix `APP` maps to `APP_DB_POOL_SIZE`: the key
//! is upper-cased and `.`/`-` become `_`. Enumeration maps names back to
//! lower-case, dot-separated keys (`APP_DB_POOL_SIZE` -> `db.pool.size`).

use crate::source::ConfigSource;
use errors::ConfigError;
use std::env;

#[derive(Debug, Clone)]
pub struct EnvSource {
    name: String,
    prefix: Option<String>
}

impl EnvSource {
    /// Source over every environment variable.
    pub fn new() -> Self {
        Self {
            name: "env".to_string(),
            prefix: None
        }
    }

    /// Source over variables named `{prefix}_*`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().to_uppercase();
        Self {
            name: format!("env:{prefix}"),
            prefix: Some(prefix)
        }
    }

    /// Environment variable name backing `key`.
    pub fn variable_name(&self, key: &str) -> String {
        let mapped: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                other => other.to_ascii_uppercase()
            })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{mapped}"),
            None => mapped
        }
    }

    fn key_for(&self, variable: &str) -> Option<String> {
        let stripped = match &self.prefix {
            Some(prefix) => variable.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
            None => variable
        };
        if stripped.is_empty() {
            return None;
        }
        Some(stripped.to_ascii_lowercase().replace('_', "."))
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(env::var_os(self.variable_name(key)).is_some())
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let variable = self.variable_name(key);
        match env::var(&variable) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ConfigError::backend(
                &self.name,
                format!("{variable} is not valid unicode")
            ))
        }
    }

    /// Keys of every matching variable, lower-cased with each `_` turned
    /// into `.`.
    ///
    /// The mapping is lossy: a key written as `db.pool-size` is listed as
    /// `db.pool.size`. Both spellings read the same variable.
    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        let mut keys: Vec<String> = env::vars_os()
            .filter_map(|(name, _)| name.into_string().ok())
            .filter_map(|name| self.key_for(&name))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
