//! # Encrypted Configuration
//!
//! Cipher stage that keeps every stored value of a node as AEAD ciphertext
//! produced by a [`CryptoProvider`].
//!
//! The stage sits at the store boundary of the node pipeline, so decoding,
//! `${}` resolution and decoration all operate on plaintext:
//!
//! ```text
//! read:  raw ciphertext -> decrypt -> decoder -> ${} -> decorator -> parse
//! write: canonical text -> encoder -> encrypt -> store
//! ```
//!
//! Ciphertext is whatever the provider emits (`base64(IV || ciphertext ||
//! tag)` for the AES-GCM provider). An absent value cannot be encrypted, so
//! writes of `None` seal the reserved [`ENCRYPTED_NULL`] literal instead and
//! reads map it back to `None` before any decoding or conversion.
//!
//! # Usage
//!
//! ```rust,no_run
//! use config::{Config, MemorySource, MutableConfig, MutableConfigNode};
//! use crypto::{CryptoSettings, PoolSettings, PooledCryptoProvider};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = CryptoSettings::default().with_salt(b"salt-bytes".to_vec());
//!     let provider = PooledCryptoProvider::from_settings("pw", settings, PoolSettings::default())?;
//!     let secrets = MutableConfigNode::builder(Arc::new(MemorySource::new("secrets")))
//!         .encrypted(Arc::new(provider))
//!         .build_mutable()?;
//!
//!     secrets.set("db.password", Some("hunter2"))?;
//!     assert_eq!(secrets.get("db.password")?.as_deref(), Some("hunter2"));
//!     Ok(())
//! }
//! ```
//!
//! Decryption failures surface as [`ConfigError::Crypto`]; a value sealed
//! under another key is [`errors::CryptoError::AuthenticationFailed`].

use crypto::CryptoProvider;
use errors::ConfigError;
use std::fmt;
use std::sync::Arc;

/// Plaintext sealed in place of an absent value.
pub const ENCRYPTED_NULL: &str = "\u{0}ENCRYPTED_NULL\u{0}";

/// Decrypted payload: either a value or the sealed absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealedValue {
    Null,
    Value(String)
}

impl SealedValue {
    pub fn from_plaintext(plaintext: String) -> Self {
        if plaintext == ENCRYPTED_NULL {
            SealedValue::Null
        } else {
            SealedValue::Value(plaintext)
        }
    }

    /// Text handed to the cipher.
    pub fn as_plaintext(&self) -> &str {
        match self {
            SealedValue::Null => ENCRYPTED_NULL,
            SealedValue::Value(text) => text
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            SealedValue::Null => None,
            SealedValue::Value(text) => Some(text)
        }
    }
}

impl From<Option<String>> for SealedValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(text) => SealedValue::Value(text),
            None => SealedValue::Null
        }
    }
}

impl From<Option<&str>> for SealedValue {
    fn from(value: Option<&str>) -> Self {
        value.map(str::to_string).into()
    }
}

/// Store-boundary encryption for one node.
#[derive(Clone)]
pub struct CipherStage {
    crypto: Arc<dyn CryptoProvider>
}

impl CipherStage {
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }

    /// Decrypt a stored value.
    pub fn open(&self, ciphertext: &str) -> Result<SealedValue, ConfigError> {
        Ok(SealedValue::from_plaintext(self.crypto.decrypt(ciphertext)?))
    }

    /// Encrypt a value for storage.
    pub fn seal(&self, value: &SealedValue) -> Result<String, ConfigError> {
        Ok(self.crypto.encrypt(value.as_plaintext())?)
    }
}

impl fmt::Debug for CipherStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherStage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigExt, MutableConfig, MutableConfigExt};
    use crate::memory::MemorySource;
    use crate::node::{ConfigNode, MutableConfigNode};
    use crate::source::{ConfigSource, MutableConfigSource};
    use crate::transform::ValueTransform;
    use crate::variables::VariableResolver;
    use errors::CryptoError;

    /// Reversible stand-in cipher: prefixes and reverses the plaintext.
    struct ReversingProvider {
        tag: &'static str
    }

    impl CryptoProvider for ReversingProvider {
        fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
            Ok(format!("{}:{}", self.tag, plaintext.chars().rev().collect::<String>()))
        }

        fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
            let body = ciphertext
                .strip_prefix(self.tag)
                .and_then(|rest| rest.strip_prefix(':'))
                .ok_or(CryptoError::AuthenticationFailed)?;
            Ok(body.chars().rev().collect())
        }
    }

    fn provider(tag: &'static str) -> Arc<dyn CryptoProvider> {
        Arc::new(ReversingProvider { tag })
    }

    fn encrypted(store: Arc<MemorySource>, tag: &'static str) -> MutableConfigNode<MemorySource> {
        MutableConfigNode::builder(store)
            .encrypted(provider(tag))
            .build_mutable()
            .unwrap()
    }

    #[test]
    fn test_values_stored_encrypted() {
        let store = Arc::new(MemorySource::new("secrets"));
        let config = encrypted(store.clone(), "k1");

        config.set("token", Some("abc")).unwrap();
        assert_eq!(store.get_raw("token").unwrap().as_deref(), Some("k1:cba"));
        assert_eq!(config.get("token").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_null_round_trips_through_placeholder() {
        let store = Arc::new(MemorySource::new("secrets"));
        let config = encrypted(store.clone(), "k1");

        config.set("token", None).unwrap();
        let stored = store.get_raw("token").unwrap().unwrap();
        assert!(stored.starts_with("k1:"));
        assert_eq!(config.get("token").unwrap(), None);
        assert_eq!(config.get_integer("token").unwrap(), None);
        assert!(config.contains_key("token").unwrap());
    }

    #[test]
    fn test_typed_round_trip() {
        let config = encrypted(Arc::new(MemorySource::new("secrets")), "k1");

        config.set_as("port", Some(&8443)).unwrap();
        config.set_as("enabled", Some(&true)).unwrap();
        assert_eq!(config.get_integer("port").unwrap(), Some(8443));
        assert_eq!(config.get_as::<u16>("port").unwrap(), Some(8443));
        assert_eq!(config.get_boolean("enabled").unwrap(), Some(true));
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let store = Arc::new(MemorySource::new("secrets"));
        encrypted(store.clone(), "k1").set("token", Some("abc")).unwrap();

        let err = encrypted(store, "k2").get("token").unwrap_err();
        assert!(matches!(err, ConfigError::Crypto(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_decorator_sees_plaintext() {
        let store = Arc::new(MemorySource::new("secrets"));
        let config = MutableConfigNode::builder(store.clone())
            .decorator(ValueTransform::new(|s| format!("<{s}>")))
            .encrypted(provider("k1"))
            .build_mutable()
            .unwrap();

        config.set("token", Some("hunter2")).unwrap();
        assert_eq!(config.get("token").unwrap().as_deref(), Some("<hunter2>"));
        assert_eq!(store.get_raw("token").unwrap().as_deref(), Some("k1:2retnuh"));
    }

    #[test]
    fn test_encoder_runs_before_encryption() {
        let store = Arc::new(MemorySource::new("secrets"));
        let config = MutableConfigNode::builder(store.clone())
            .encoder(ValueTransform::new(|s| s.to_uppercase()))
            .decoder(ValueTransform::new(|s| s.to_lowercase()))
            .encrypted(provider("k1"))
            .build_mutable()
            .unwrap();

        config.set("name", Some("Admin")).unwrap();
        assert_eq!(store.get_raw("name").unwrap().as_deref(), Some("k1:NIMDA"));
        assert_eq!(config.get("name").unwrap().as_deref(), Some("admin"));
    }

    #[test]
    fn test_variables_expand_inside_secrets() {
        let config = MutableConfigNode::builder(Arc::new(MemorySource::new("secrets")))
            .variables(VariableResolver::new())
            .encrypted(provider("k1"))
            .build_mutable()
            .unwrap();

        config.set("user", Some("admin")).unwrap();
        config.set("dsn", Some("db://${user}@host")).unwrap();
        assert_eq!(config.get("dsn").unwrap().as_deref(), Some("db://admin@host"));

        config.set("user", None).unwrap();
        assert_eq!(config.get("dsn").unwrap().as_deref(), Some("db://${user}@host"));
    }

    #[test]
    fn test_plain_child_over_encrypted_parent() {
        let parent_store = Arc::new(MemorySource::new("parent"));
        encrypted(parent_store.clone(), "k1").set("token", Some("inherited")).unwrap();
        let parent = ConfigNode::builder(parent_store)
            .encrypted(provider("k1"))
            .build()
            .unwrap();

        let child = ConfigNode::builder(Arc::new(MemorySource::new("child")))
            .parent(Arc::new(parent))
            .variables(VariableResolver::new())
            .build()
            .unwrap();
        child.source().set_raw("header", Some("Bearer ${token}".to_string())).unwrap();

        assert_eq!(child.get("token").unwrap().as_deref(), Some("inherited"));
        assert_eq!(child.get("header").unwrap().as_deref(), Some("Bearer inherited"));
        assert_eq!(child.get("missing").unwrap(), None);
    }

    #[test]
    fn test_placeholder_is_distinct_from_empty() {
        assert_eq!(SealedValue::from_plaintext(String::new()), SealedValue::Value(String::new()));
        assert_eq!(SealedValue::from_plaintext(ENCRYPTED_NULL.to_string()), SealedValue::Null);
        assert_eq!(SealedValue::from(None::<&str>).as_plaintext(), ENCRYPTED_NULL);
    }

    #[test]
    fn test_stage_open_and_seal() {
        let stage = CipherStage::new(provider("k1"));
        let sealed = stage.seal(&SealedValue::Null).unwrap();
        assert_eq!(stage.open(&sealed).unwrap(), SealedValue::Null);
        assert!(matches!(stage.open("garbage"), Err(ConfigError::Crypto(_))));
    }
}
