//! # Configuration Contracts
//!
//! Read and write interfaces shared by hierarchy nodes and the
//! change-notifying wrapper.
//!
//! Every accessor returns `Ok(None)` for a key that is absent from the
//! whole hierarchy. A key that is declared but holds no value is also
//! `Ok(None)`; use [`Config::contains_key`] to tell the two apart.

use crate::convert::{Converted, ConverterRegistry, Number, TargetType, downcast};
use errors::ConfigError;
use std::fmt::Display;

/// Read-only, hierarchical configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Typed lookup over one node and, when the key is not local, its parent
/// chain.
///
/// ## Typed Accessors
/// Each typed accessor parses the fully processed string of the node that
/// owns the key. A node that does not own the key forwards the same typed
/// call to its parent.
///
/// ## Thread Safety
/// Implementations are `Send + Sync`; concurrent reads are always safe.
pub trait Config: Send + Sync {
    /// Whether `key` is declared locally or anywhere up the parent chain.
    fn contains_key(&self, key: &str) -> Result<bool, ConfigError>;

    fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;

    /// Value after decoding and `${}` resolution, before the decorator.
    ///
    /// Child nodes substitute this form for `${key}` so that the decorator
    /// runs once, on the child's expanded value.
    fn get_undecorated(&self, key: &str) -> Result<Option<String>, ConfigError>;

    /// Case-insensitive `"true"` is `true`, every other value is `false`.
    fn get_boolean(&self, key: &str) -> Result<Option<bool>, ConfigError>;

    fn get_integer(&self, key: &str) -> Result<Option<i32>, ConfigError>;

    fn get_long(&self, key: &str) -> Result<Option<i64>, ConfigError>;

    /// Narrowest exact numeric representation of the value.
    fn get_number(&self, key: &str) -> Result<Option<Number>, ConfigError>;

    /// Value converted through the registry into `target`.
    fn get_converted(&self, key: &str, target: &TargetType) -> Result<Option<Converted>, ConfigError>;

    /// Sorted, de-duplicated keys of this node and its ancestors.
    fn keys(&self) -> Result<Vec<String>, ConfigError>;

    fn converters(&self) -> &ConverterRegistry;

    /// Number of ancestors above this configuration.
    fn depth(&self) -> usize {
        0
    }
}

/// Write access to the local store of a configuration.
///
/// Writes never reach a parent.
pub trait MutableConfig: Config {
    /// Store `value` under `key`; `None` stores an explicit absent value.
    fn set(&self, key: &str, value: Option<&str>) -> Result<(), ConfigError>;

    fn remove(&self, keys: &[&str]) -> Result<(), ConfigError>;
}

/// Generic and defaulting helpers available on every [`Config`].
pub trait ConfigExt: Config {
    /// Value of `key` converted to `T`.
    ///
    /// ```
    /// use config::{ConfigExt, ConfigNode, MemorySource};
    /// use std::sync::Arc;
    ///
    /// let node = ConfigNode::new(Arc::new(MemorySource::from_pairs("mem", [("port", "8080")])));
    /// assert_eq!(node.get_as::<u16>("port").unwrap(), Some(8080));
    /// ```
    fn get_as<T: Send + 'static>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let target = TargetType::of::<T>();
        self.get_converted(key, &target)?
            .map(|value| downcast(key, &target, value))
            .transpose()
    }

    fn get_or(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// `default` is only invoked when the value is absent.
    fn get_or_else(&self, key: &str, default: impl FnOnce() -> String) -> Result<String, ConfigError> {
        Ok(self.get(key)?.unwrap_or_else(default))
    }

    fn get_as_or<T: Send + 'static>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    fn get_as_or_else<T: Send + 'static>(
        &self,
        key: &str,
        default: impl FnOnce() -> T
    ) -> Result<T, ConfigError> {
        Ok(self.get_as(key)?.unwrap_or_else(default))
    }

    fn get_boolean_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        Ok(self.get_boolean(key)?.unwrap_or(default))
    }

    fn get_integer_or(&self, key: &str, default: i32) -> Result<i32, ConfigError> {
        Ok(self.get_integer(key)?.unwrap_or(default))
    }

    fn get_long_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        Ok(self.get_long(key)?.unwrap_or(default))
    }
}

impl<C: Config + ?Sized> ConfigExt for C {}

/// Typed writes through the registry's canonical string form.
pub trait MutableConfigExt: MutableConfig {
    /// Store `value` in its canonical form: the registered formatter for
    /// `T` when there is one, otherwise `Display`.
    fn set_as<T: Display + 'static>(&self, key: &str, value: Option<&T>) -> Result<(), ConfigError> {
        let text = value.map(|v| self.converters().to_canonical(v));
        self.set(key, text.as_deref())
    }

    /// Store `value` using its registered formatter.
    ///
    /// Fails with [`ConfigError::NoConverter`] when `T` has none.
    fn set_formatted<T: 'static>(&self, key: &str, value: Option<&T>) -> Result<(), ConfigError> {
        let text = match value {
            Some(v) => Some(self.converters().format_registered(v).ok_or_else(|| {
                ConfigError::NoConverter {
                    target: std::any::type_name::<T>().to_string()
                }
            })?),
            None => None
        };
        self.set(key, text.as_deref())
    }
}

impl<C: MutableConfig + ?Sized> MutableConfigExt for C {}
