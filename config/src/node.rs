//! # Hierarchy Nodes
//!
//! [`ConfigNode`] binds a [`ConfigSource`] to an optional parent and the
//! value pipeline. [`MutableConfigNode`] adds writes through an encoder.
//!
//! # Value Pipeline
//!
//! ```text
//! read:  raw -> [decrypt] -> decoder -> ${} resolution -> decorator -> typed parse
//! write: text -> encoder -> [encrypt] -> store
//! ```
//!
//! The bracketed stages only run on nodes built with
//! [`ConfigNodeBuilder::encrypted`].
//!
//! A node owns a key when its source declares it. Owned keys are answered
//! locally even when the stored value is absent; other keys are forwarded,
//! unchanged, to the parent's matching accessor.

use crate::config::{Config, MutableConfig};
use crate::convert::{self, Converted, ConverterRegistry, Number, TargetType};
use crate::encrypted::{CipherStage, SealedValue};
use crate::source::{ConfigSource, MutableConfigSource};
use crate::transform::ValueTransform;
use crate::variables::{Substitution, VariableResolver};
use crypto::CryptoProvider;
use errors::ConfigError;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Maximum number of ancestors above any node.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Read-only node of a configuration hierarchy.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```
/// use config::{Config, ConfigNode, MemorySource};
/// use std::sync::Arc;
///
/// let defaults = ConfigNode::new(Arc::new(MemorySource::from_pairs(
///     "defaults",
///     [("host", "b.com"), ("port", "80")]
/// )));
/// let node = ConfigNode::builder(Arc::new(MemorySource::from_pairs("local", [("host", "a.com")])))
///     .parent(Arc::new(defaults))
///     .build()
///     .unwrap();
///
/// assert_eq!(node.get("host").unwrap().as_deref(), Some("a.com"));
/// assert_eq!(node.get_integer("port").unwrap(), Some(80));
/// assert_eq!(node.get("missing").unwrap(), None);
/// ```
///
/// ## Variables
/// With a [`VariableResolver`] attached, `${name}` inside a value expands to
/// the value of `name`. Local references go through this node's decoder and
/// resolver; parent references arrive decoded and resolved by the parent.
/// Either way the decorator runs once, on the whole expanded value.
pub struct ConfigNode<S: ConfigSource + ?Sized = dyn ConfigSource> {
    pub(crate) source: Arc<S>,
    parent: Option<Arc<dyn Config>>,
    decoder: ValueTransform,
    decorator: ValueTransform,
    resolver: Option<VariableResolver>,
    cipher: Option<CipherStage>,
    converters: Arc<ConverterRegistry>,
    depth: usize
}

/// Builder for [`ConfigNode`] and [`MutableConfigNode`].
pub struct ConfigNodeBuilder<S: ConfigSource + ?Sized> {
    source: Arc<S>,
    parent: Option<Arc<dyn Config>>,
    decoder: ValueTransform,
    decorator: ValueTransform,
    encoder: ValueTransform,
    resolver: Option<VariableResolver>,
    cipher: Option<CipherStage>,
    converters: Option<Arc<ConverterRegistry>>
}

impl<S: ConfigSource + ?Sized> ConfigNodeBuilder<S> {
    pub fn parent(mut self, parent: Arc<dyn Config>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Applied to raw values before variable resolution.
    pub fn decoder(mut self, decoder: ValueTransform) -> Self {
        self.decoder = decoder;
        self
    }

    /// Applied after variable resolution, before typed parsing.
    pub fn decorator(mut self, decorator: ValueTransform) -> Self {
        self.decorator = decorator;
        self
    }

    /// Applied to values before they are stored. Only used by mutable nodes.
    pub fn encoder(mut self, encoder: ValueTransform) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn variables(mut self, resolver: VariableResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Store every value of this node as ciphertext produced by `crypto`.
    ///
    /// Reads decrypt before the decoder; writes encrypt after the encoder.
    pub fn encrypted(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.cipher = Some(CipherStage::new(crypto));
        self
    }

    /// Registry used for typed reads and canonical writes.
    ///
    /// Defaults to a fresh [`ConverterRegistry::default`].
    pub fn converters(mut self, converters: Arc<ConverterRegistry>) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Build the read-only node.
    ///
    /// Fails with [`ConfigError::HierarchyTooDeep`] when the parent chain
    /// would exceed [`MAX_HIERARCHY_DEPTH`].
    pub fn build(self) -> Result<ConfigNode<S>, ConfigError> {
        Ok(self.into_parts()?.0)
    }

    fn into_parts(self) -> Result<(ConfigNode<S>, ValueTransform), ConfigError> {
        let depth = match &self.parent {
            Some(parent) => parent.depth() + 1,
            None => 0
        };
        if depth > MAX_HIERARCHY_DEPTH {
            return Err(ConfigError::HierarchyTooDeep {
                depth,
                max_depth: MAX_HIERARCHY_DEPTH
            });
        }

        let node = ConfigNode {
            source: self.source,
            parent: self.parent,
            decoder: self.decoder,
            decorator: self.decorator,
            resolver: self.resolver,
            cipher: self.cipher,
            converters: self
                .converters
                .unwrap_or_else(|| Arc::new(ConverterRegistry::default())),
            depth
        };
        Ok((node, self.encoder))
    }
}

impl<S: MutableConfigSource + ?Sized> ConfigNodeBuilder<S> {
    /// Build a writable node over the same source.
    pub fn build_mutable(self) -> Result<MutableConfigNode<S>, ConfigError> {
        let (node, encoder) = self.into_parts()?;
        Ok(MutableConfigNode { node, encoder })
    }
}

impl<S: ConfigSource + ?Sized> ConfigNode<S> {
    /// Root node with identity transforms and no variable resolution.
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            parent: None,
            decoder: ValueTransform::identity(),
            decorator: ValueTransform::identity(),
            resolver: None,
            cipher: None,
            converters: Arc::new(ConverterRegistry::default()),
            depth: 0
        }
    }

    pub fn builder(source: Arc<S>) -> ConfigNodeBuilder<S> {
        ConfigNodeBuilder {
            source,
            parent: None,
            decoder: ValueTransform::identity(),
            decorator: ValueTransform::identity(),
            encoder: ValueTransform::identity(),
            resolver: None,
            cipher: None,
            converters: None
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn parent(&self) -> Option<&Arc<dyn Config>> {
        self.parent.as_ref()
    }

    /// Answer locally when the key is owned, otherwise forward to the parent.
    fn lookup<T>(
        &self,
        key: &str,
        local: impl FnOnce(String) -> Result<T, ConfigError>,
        delegate: impl FnOnce(&dyn Config) -> Result<Option<T>, ConfigError>
    ) -> Result<Option<T>, ConfigError> {
        if self.source.contains_key(key)? {
            return self.read_local(key)?.map(local).transpose();
        }
        match &self.parent {
            Some(parent) => {
                trace!(key, source = self.source.name(), "Key not local, delegating to parent");
                delegate(parent.as_ref())
            }
            None => Ok(None)
        }
    }

    /// Stored value with the cipher stage applied; the sealed null is `None`.
    fn read_stored(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let Some(raw) = self.source.get_raw(key)? else {
            return Ok(None);
        };
        match &self.cipher {
            Some(cipher) => Ok(cipher.open(&raw)?.into_option()),
            None => Ok(Some(raw))
        }
    }

    fn read_resolved(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let Some(stored) = self.read_stored(key)? else {
            return Ok(None);
        };
        let decoded = self.decoder.apply(stored);
        match &self.resolver {
            Some(resolver) => resolver
                .resolve(key, decoded, |name| self.variable(name))
                .map(Some),
            None => Ok(Some(decoded))
        }
    }

    fn read_local(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self
            .read_resolved(key)?
            .map(|resolved| self.decorator.apply(resolved)))
    }

    fn variable(&self, name: &str) -> Result<Option<Substitution>, ConfigError> {
        if self.source.contains_key(name)? {
            return Ok(self
                .read_stored(name)?
                .map(|stored| Substitution::Unresolved(self.decoder.apply(stored))));
        }
        match &self.parent {
            Some(parent) => Ok(parent.get_undecorated(name)?.map(Substitution::Resolved)),
            None => Ok(None)
        }
    }
}

impl<S: ConfigSource + ?Sized> Config for ConfigNode<S> {
    fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        if self.source.contains_key(key)? {
            return Ok(true);
        }
        match &self.parent {
            Some(parent) => parent.contains_key(key),
            None => Ok(false)
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.lookup(key, Ok, |parent| parent.get(key))
    }

    fn get_undecorated(&self, key: &str) -> Result<Option<String>, ConfigError> {
        if self.source.contains_key(key)? {
            return self.read_resolved(key);
        }
        match &self.parent {
            Some(parent) => parent.get_undecorated(key),
            None => Ok(None)
        }
    }

    fn get_boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.lookup(
            key,
            |text| Ok(convert::parse_boolean(&text)),
            |parent| parent.get_boolean(key)
        )
    }

    fn get_integer(&self, key: &str) -> Result<Option<i32>, ConfigError> {
        self.lookup(
            key,
            |text| convert::parse_integer(key, &text),
            |parent| parent.get_integer(key)
        )
    }

    fn get_long(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.lookup(
            key,
            |text| convert::parse_long(key, &text),
            |parent| parent.get_long(key)
        )
    }

    fn get_number(&self, key: &str) -> Result<Option<Number>, ConfigError> {
        self.lookup(
            key,
            |text| convert::parse_number(key, &text),
            |parent| parent.get_number(key)
        )
    }

    fn get_converted(&self, key: &str, target: &TargetType) -> Result<Option<Converted>, ConfigError> {
        self.lookup(
            key,
            |text| self.converters.convert_erased(key, &text, target),
            |parent| parent.get_converted(key, target)
        )
    }

    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        let mut keys: BTreeSet<String> = self.source.keys()?.into_iter().collect();
        if let Some(parent) = &self.parent {
            keys.extend(parent.keys()?);
        }
        Ok(keys.into_iter().collect())
    }

    fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    fn depth(&self) -> usize {
        self.depth
    }
}

impl<S: ConfigSource + ?Sized> fmt::Debug for ConfigNode<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigNode")
            .field("source", &self.source.name())
            .field("depth", &self.depth)
            .field("has_parent", &self.parent.is_some())
            .field("decoder", &self.decoder)
            .field("decorator", &self.decorator)
            .field("resolver", &self.resolver)
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

/// Writable node: a [`ConfigNode`] over a [`MutableConfigSource`] plus an
/// encoder applied on every write.
pub struct MutableConfigNode<S: MutableConfigSource + ?Sized = dyn MutableConfigSource> {
    node: ConfigNode<S>,
    encoder: ValueTransform
}

impl<S: MutableConfigSource + ?Sized> MutableConfigNode<S> {
    /// Root node with identity transforms.
    pub fn new(source: Arc<S>) -> Self {
        Self {
            node: ConfigNode::new(source),
            encoder: ValueTransform::identity()
        }
    }

    pub fn builder(source: Arc<S>) -> ConfigNodeBuilder<S> {
        ConfigNode::builder(source)
    }

    pub fn node(&self) -> &ConfigNode<S> {
        &self.node
    }
}

impl<S: MutableConfigSource + ?Sized> Config for MutableConfigNode<S> {
    fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        self.node.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.node.get(key)
    }

    fn get_undecorated(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.node.get_undecorated(key)
    }

    fn get_boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.node.get_boolean(key)
    }

    fn get_integer(&self, key: &str) -> Result<Option<i32>, ConfigError> {
        self.node.get_integer(key)
    }

    fn get_long(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.node.get_long(key)
    }

    fn get_number(&self, key: &str) -> Result<Option<Number>, ConfigError> {
        self.node.get_number(key)
    }

    fn get_converted(&self, key: &str, target: &TargetType) -> Result<Option<Converted>, ConfigError> {
        self.node.get_converted(key, target)
    }

    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        self.node.keys()
    }

    fn converters(&self) -> &ConverterRegistry {
        self.node.converters()
    }

    fn depth(&self) -> usize {
        self.node.depth()
    }
}

impl<S: MutableConfigSource + ?Sized> MutableConfig for MutableConfigNode<S> {
    fn set(&self, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        let encoded = value.map(|v| self.encoder.apply(v.to_string()));
        let stored = match &self.node.cipher {
            Some(cipher) => Some(cipher.seal(&SealedValue::from(encoded))?),
            None => encoded
        };
        self.node.source.set_raw(key, stored)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), ConfigError> {
        self.node.source.remove_keys(keys)
    }
}

impl<S: MutableConfigSource + ?Sized> fmt::Debug for MutableConfigNode<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableConfigNode")
            .field("node", &self.node)
            .field("encoder", &self.encoder)
            .finish()
    }
}
