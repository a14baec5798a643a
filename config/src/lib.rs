//! # Configuration System
//!
//! Hierarchical, typed configuration over pluggable backing stores.
//!
//! This crate provides:
//! - Read-only and mutable configuration nodes with parent fallback
//! - A decode, `${}` resolution, decorate and encode value pipeline
//! - A type-indexed converter registry with ancestor fallback
//! - Store-boundary encryption backed by [`crypto::CryptoProvider`]
//! - Batched asynchronous change notification
//! - In-memory, environment and TOML/YAML file sources
//!
//! # Example
//!
//! ```
//! use config::{Config, ConfigExt, ConfigNode, EnvSource, MemorySource, VariableResolver};
//! use std::sync::Arc;
//!
//! let env = ConfigNode::new(Arc::new(EnvSource::with_prefix("DOCTEST_UNSET")));
//! let app = ConfigNode::builder(Arc::new(MemorySource::from_pairs(
//!     "app",
//!     [("host", "localhost"), ("url", "http://${host}:8080")]
//! )))
//! .parent(Arc::new(env))
//! .variables(VariableResolver::new())
//! .build()
//! .unwrap();
//!
//! assert_eq!(app.get("url").unwrap().as_deref(), Some("http://localhost:8080"));
//! assert_eq!(app.get_as_or::<u32>("workers", 4).unwrap(), 4);
//! ```

pub mod config;
pub mod convert;
pub mod encrypted;
pub mod env;
pub mod file_loader;
pub mod memory;
pub mod node;
pub mod source;
pub mod transform;
pub mod variables;
pub mod watch;

pub use config::{Config, ConfigExt, MutableConfig, MutableConfigExt};
pub use convert::{Converted, ConverterRegistry, Floating, Integral, Number, TargetType};
pub use encrypted::{CipherStage, ENCRYPTED_NULL, SealedValue};
pub use env::EnvSource;
pub use errors::ConfigError;
pub use file_loader::{FileFormat, FileSource};
pub use memory::MemorySource;
pub use node::{ConfigNode, ConfigNodeBuilder, MAX_HIERARCHY_DEPTH, MutableConfigNode};
pub use source::{ConfigSource, MutableConfigSource};
pub use transform::ValueTransform;
pub use variables::{Substitution, VariableResolver};
pub use watch::{ConfigChangeEvent, ConfigChangeListener, ListenerId, WatchSettings, WatchableConfig};
