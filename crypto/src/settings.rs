//! # Crypto Settings
//!
//! Parameters for key derivation, the AEAD cipher and the cipher pool.
//!
//! Names of algorithms are kept as strings so settings can be loaded from
//! files or the environment; they are parsed into [`KdfAlgorithm`],
//! [`KeyAlgorithm`] and [`Transformation`] when an engine is built.

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use errors::CryptoError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use validator::Validate;

pub const DEFAULT_KDF_ALGORITHM: &str = "PBKDF2WithHmacSHA256";
pub const DEFAULT_KEY_ALGORITHM: &str = "AES";
pub const DEFAULT_TRANSFORMATION: &str = "AES/GCM/NoPadding";
pub const DEFAULT_KEY_LENGTH_BITS: u32 = 256;
pub const DEFAULT_ITERATIONS: u32 = 65_536;
pub const DEFAULT_IV_LENGTH: usize = 12;
pub const DEFAULT_TAG_LENGTH_BITS: u32 = 128;
pub const GENERATED_SALT_LENGTH: usize = 16;

/// Password-based key derivation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum KdfAlgorithm {
    #[strum(serialize = "PBKDF2WithHmacSHA256")]
    Pbkdf2HmacSha256,
    #[strum(serialize = "PBKDF2WithHmacSHA512")]
    Pbkdf2HmacSha512
}

/// Symmetric key algorithms the derived bytes are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum KeyAlgorithm {
    #[strum(serialize = "AES")]
    Aes
}

/// Cipher transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Transformation {
    #[strum(serialize = "AES/GCM/NoPadding")]
    AesGcmNoPadding
}

/// Crypto configuration surface.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Describes how a passphrase becomes a key and how values are sealed.
///
/// ## Fields
/// - `kdf_algorithm`: key derivation function (default: "PBKDF2WithHmacSHA256")
/// - `key_algorithm`: symmetric key algorithm (default: "AES")
/// - `transformation`: cipher transformation (default: "AES/GCM/NoPadding")
/// - `key_length_bits`: derived key length, 128/192/256 (default: 256)
/// - `iterations`: PBKDF2 iteration count (default: 65536)
/// - `salt`: derivation salt; required, see [`CryptoSettings::with_generated_salt`]
/// - `iv_length`: IV bytes per message, 12 or 16 (default: 12)
/// - `tag_length_bits`: authentication tag length (default and only value: 128)
///
/// ## Usage
/// ```rust,no_run
/// use crypto::CryptoSettings;
///
/// let settings = CryptoSettings::default().with_salt(b"per-deployment-salt".to_vec());
/// assert_eq!(settings.iv_length, 12);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CryptoSettings {
    #[serde(default = "default_kdf_algorithm")]
    pub kdf_algorithm: String,

    #[serde(default = "default_key_algorithm")]
    pub key_algorithm: String,

    #[serde(default = "default_transformation")]
    pub transformation: String,

    #[serde(default = "default_key_length_bits")]
    #[validate(range(min = 128, max = 256))]
    pub key_length_bits: u32,

    #[serde(default = "default_iterations")]
    #[validate(range(min = 1))]
    pub iterations: u32,

    #[serde(default)]
    pub salt: Option<Vec<u8>>,

    #[serde(default = "default_iv_length")]
    #[validate(range(min = 12, max = 16))]
    pub iv_length: usize,

    #[serde(default = "default_tag_length_bits")]
    pub tag_length_bits: u32
}

fn default_kdf_algorithm() -> String {
    DEFAULT_KDF_ALGORITHM.to_string()
}

fn default_key_algorithm() -> String {
    DEFAULT_KEY_ALGORITHM.to_string()
}

fn default_transformation() -> String {
    DEFAULT_TRANSFORMATION.to_string()
}

fn default_key_length_bits() -> u32 {
    DEFAULT_KEY_LENGTH_BITS
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_iv_length() -> usize {
    DEFAULT_IV_LENGTH
}

fn default_tag_length_bits() -> u32 {
    DEFAULT_TAG_LENGTH_BITS
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            kdf_algorithm: default_kdf_algorithm(),
            key_algorithm: default_key_algorithm(),
            transformation: default_transformation(),
            key_length_bits: default_key_length_bits(),
            iterations: default_iterations(),
            salt: None,
            iv_length: default_iv_length(),
            tag_length_bits: default_tag_length_bits()
        }
    }
}

/// Settings after validation, with algorithm names resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedAlgorithms {
    pub kdf: KdfAlgorithm,
    pub key: KeyAlgorithm,
    pub transformation: Transformation
}

impl CryptoSettings {
    pub fn with_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Fill the salt with fresh bytes from the OS random source.
    ///
    /// The generated salt must be persisted by the caller; without it the
    /// same passphrase derives a different key on the next start.
    pub fn with_generated_salt(mut self) -> Self {
        let mut salt = vec![0u8; GENERATED_SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        self.salt = Some(salt);
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_key_length_bits(mut self, bits: u32) -> Self {
        self.key_length_bits = bits;
        self
    }

    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        (self.key_length_bits / 8) as usize
    }

    /// Tag length in bytes.
    pub fn tag_length(&self) -> usize {
        (self.tag_length_bits / 8) as usize
    }

    /// Check every parameter and resolve algorithm names.
    ///
    /// All failures are reported as [`CryptoError::Configuration`].
    pub(crate) fn resolve(&self) -> Result<ResolvedAlgorithms, CryptoError> {
        self.validate()
            .map_err(|e| CryptoError::configuration(e.to_string()))?;

        match self.salt.as_deref() {
            None => return Err(CryptoError::configuration("salt is required")),
            Some([]) => return Err(CryptoError::configuration("salt must not be empty")),
            Some(_) => {}
        }
        if !matches!(self.key_length_bits, 128 | 192 | 256) {
            return Err(CryptoError::configuration(format!(
                "unsupported key length: {} bits",
                self.key_length_bits
            )));
        }
        if !matches!(self.iv_length, 12 | 16) {
            return Err(CryptoError::configuration(format!(
                "unsupported IV length: {} bytes",
                self.iv_length
            )));
        }
        if self.tag_length_bits != DEFAULT_TAG_LENGTH_BITS {
            return Err(CryptoError::configuration(format!(
                "unsupported tag length: {} bits",
                self.tag_length_bits
            )));
        }

        Ok(ResolvedAlgorithms {
            kdf: parse_algorithm(&self.kdf_algorithm, "key derivation")?,
            key: parse_algorithm(&self.key_algorithm, "key")?,
            transformation: parse_algorithm(&self.transformation, "cipher transformation")?
        })
    }

    /// Load settings from environment variables.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Environment Variables
    /// - `CONFIG_CRYPTO_KDF_ALGORITHM` (default: "PBKDF2WithHmacSHA256")
    /// - `CONFIG_CRYPTO_KEY_ALGORITHM` (default: "AES")
    /// - `CONFIG_CRYPTO_TRANSFORMATION` (default: "AES/GCM/NoPadding")
    /// - `CONFIG_CRYPTO_KEY_LENGTH_BITS` (default: 256)
    /// - `CONFIG_CRYPTO_ITERATIONS` (default: 65536)
    /// - `CONFIG_CRYPTO_SALT`: salt as UTF-8 text (no default)
    /// - `CONFIG_CRYPTO_IV_LENGTH` (default: 12)
    /// - `CONFIG_CRYPTO_TAG_LENGTH_BITS` (default: 128)
    ///
    /// ## Error Handling
    /// A variable that is set but does not parse is a configuration error.
    pub fn from_env() -> Result<Self, CryptoError> {
        Ok(Self {
            kdf_algorithm: env::var("CONFIG_CRYPTO_KDF_ALGORITHM")
                .unwrap_or_else(|_| default_kdf_algorithm()),
            key_algorithm: env::var("CONFIG_CRYPTO_KEY_ALGORITHM")
                .unwrap_or_else(|_| default_key_algorithm()),
            transformation: env::var("CONFIG_CRYPTO_TRANSFORMATION")
                .unwrap_or_else(|_| default_transformation()),
            key_length_bits: parse_env("CONFIG_CRYPTO_KEY_LENGTH_BITS")?
                .unwrap_or(DEFAULT_KEY_LENGTH_BITS),
            iterations: parse_env("CONFIG_CRYPTO_ITERATIONS")?.unwrap_or(DEFAULT_ITERATIONS),
            salt: env::var("CONFIG_CRYPTO_SALT").ok().map(String::into_bytes),
            iv_length: parse_env("CONFIG_CRYPTO_IV_LENGTH")?.unwrap_or(DEFAULT_IV_LENGTH),
            tag_length_bits: parse_env("CONFIG_CRYPTO_TAG_LENGTH_BITS")?
                .unwrap_or(DEFAULT_TAG_LENGTH_BITS)
        })
    }
}

fn parse_algorithm<T: FromStr>(name: &str, kind: &str) -> Result<T, CryptoError> {
    name.parse::<T>()
        .map_err(|_| CryptoError::configuration(format!("unknown {kind} algorithm: {name}")))
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, CryptoError>
where
    T::Err: std::fmt::Display
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| CryptoError::configuration(format!("{name}: {e}"))),
        Err(_) => Ok(None)
    }
}

/// Cipher pool sizing and eviction.
///
/// Idle ciphers older than `idle_timeout` are dropped and transparently
/// recreated on the next borrow.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct PoolSettings {
    /// Maximum ciphers alive at once (borrowed + idle)
    #[validate(range(min = 1))]
    pub max_total: usize,

    /// Maximum ciphers kept idle
    pub max_idle: usize,

    /// Idle time after which a cipher is evicted
    #[serde(with = "duration_millis")]
    pub idle_timeout: Duration
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_total: 64,
            max_idle: 8,
            idle_timeout: Duration::from_secs(300)
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
