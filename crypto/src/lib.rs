//! # Configuration Crypto
//!
//! Protection of sensitive configuration values.
//!
//! This crate provides:
//! - PBKDF2 key derivation from a passphrase
//! - AES-GCM authenticated encryption with a fresh IV per value
//! - A bounded pool of reusable cipher objects
//! - A concurrency-safe provider composing engine, key and pool
//!
//! # Best Practices
//!
//! - Key bytes are zeroized on drop and never logged
//! - Wrong-key and tampered-data failures are a distinct error kind
//! - Invalid parameters fail fast at construction

pub mod engine;
pub mod key;
pub mod pool;
pub mod provider;
pub mod settings;

pub use engine::{AesGcmEngine, CryptoEngine, GcmCipher};
pub use errors::{CryptoError, PoolError};
pub use key::{KeyDerivationParams, SecretKeyMaterial, derive_key};
pub use pool::{CipherPool, EngineCipherFactory, ObjectPool, PoolStats, PooledObjectFactory};
pub use provider::{CryptoProvider, PooledCryptoProvider};
pub use settings::{CryptoSettings, KdfAlgorithm, KeyAlgorithm, PoolSettings, Transformation};
