//! In-memory backing store.

use crate::source::{ConfigSource, MutableConfigSource};
use errors::ConfigError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Thread-safe, enumerable, mutable map store.
///
/// A key set to `None` stays declared: `contains_key` is true and
/// `get_raw` returns `None`.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    entries: RwLock<BTreeMap<String, Option<String>>>
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new())
        }
    }

    pub fn from_pairs<K, V>(name: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Some(v.into())))
            .collect();
        Self {
            name: name.into(),
            entries: RwLock::new(entries)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.entries.read().get(key).cloned().flatten())
    }

    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

impl MutableConfigSource for MemorySource {
    fn set_raw(&self, key: &str, value: Option<String>) -> Result<(), ConfigError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_keys(&self, keys: &[&str]) -> Result<(), ConfigError> {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
