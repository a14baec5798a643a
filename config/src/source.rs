//! # Backing Stores
//!
//! Minimal contract every storage backend exposes to configuration nodes.
//!
//! Sources deal in raw strings only: no decoding, conversion or fallback
//! happens here. Thread-safety of the underlying store is each backend's
//! own responsibility.

use errors::ConfigError;

/// Read side of a flat, string-keyed store.
pub trait ConfigSource: Send + Sync {
    /// Name used in log lines and error messages.
    fn name(&self) -> &str;

    /// Whether the store declares `key`, even with an empty value.
    fn contains_key(&self, key: &str) -> Result<bool, ConfigError>;

    fn get_raw(&self, key: &str) -> Result<Option<String>, ConfigError>;

    /// Every key the store declares.
    ///
    /// Backends that cannot enumerate keep this default, which reports
    /// [`ConfigError::EnumerationUnsupported`] rather than an empty list.
    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        Err(ConfigError::EnumerationUnsupported {
            source_name: self.name().to_string()
        })
    }
}

/// Write side of a store.
pub trait MutableConfigSource: ConfigSource {
    /// Store `value` under `key`; `None` stores an explicit absent value.
    fn set_raw(&self, key: &str, value: Option<String>) -> Result<(), ConfigError>;

    fn remove_keys(&self, keys: &[&str]) -> Result<(), ConfigError>;
}
