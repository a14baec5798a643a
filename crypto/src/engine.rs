//! # Crypto Engine
//!
//! Key derivation plus AES-GCM sealing behind a swappable trait.
//!
//! Stored ciphertext is `base64(IV || ciphertext || tag)` with the standard
//! base64 alphabet. A fresh random IV is drawn for every encryption.

use crate::key::{SecretKeyMaterial, derive_key};
use crate::settings::CryptoSettings;
use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::{Aes128, Aes192, Aes256};
use aes_gcm::AesGcm;
use base64::{Engine as _, engine::general_purpose};
use errors::CryptoError;
use zeroize::Zeroize;

/// Swappable cryptographic engine.
///
/// Engines hold no mutable shared state; all per-operation state lives in the
/// `Cipher` object, which is never used by two operations at once.
pub trait CryptoEngine: Send + Sync {
    type Cipher: Send;

    /// Derive the secret key for `passphrase` with the engine's parameters.
    fn create_secret_key(&self, passphrase: &str) -> Result<SecretKeyMaterial, CryptoError>;

    /// Create a fresh cipher object. Never returns a shared instance.
    fn create_cipher(&self) -> Result<Self::Cipher, CryptoError>;

    fn encrypt(
        &self,
        plaintext: &str,
        key: &SecretKeyMaterial,
        cipher: &mut Self::Cipher
    ) -> Result<String, CryptoError>;

    fn decrypt(
        &self,
        ciphertext: &str,
        key: &SecretKeyMaterial,
        cipher: &mut Self::Cipher
    ) -> Result<String, CryptoError>;
}

type Gcm<A, N> = AesGcm<A, N>;

enum Schedule {
    Aes128Iv12(Gcm<Aes128, U12>),
    Aes192Iv12(Gcm<Aes192, U12>),
    Aes256Iv12(Gcm<Aes256, U12>),
    Aes128Iv16(Gcm<Aes128, U16>),
    Aes192Iv16(Gcm<Aes192, U16>),
    Aes256Iv16(Gcm<Aes256, U16>)
}

macro_rules! with_schedule {
    ($schedule:expr, $gcm:ident => $body:expr) => {
        match $schedule {
            Schedule::Aes128Iv12($gcm) => $body,
            Schedule::Aes192Iv12($gcm) => $body,
            Schedule::Aes256Iv12($gcm) => $body,
            Schedule::Aes128Iv16($gcm) => $body,
            Schedule::Aes192Iv16($gcm) => $body,
            Schedule::Aes256Iv16($gcm) => $body
        }
    };
}

impl Schedule {
    fn new(key: &[u8], iv_length: usize) -> Result<Self, CryptoError> {
        let invalid = |_| CryptoError::configuration(format!("invalid AES key length: {} bytes", key.len()));
        let schedule = match (key.len(), iv_length) {
            (16, 12) => Self::Aes128Iv12(KeyInit::new_from_slice(key).map_err(invalid)?),
            (24, 12) => Self::Aes192Iv12(KeyInit::new_from_slice(key).map_err(invalid)?),
            (32, 12) => Self::Aes256Iv12(KeyInit::new_from_slice(key).map_err(invalid)?),
            (16, 16) => Self::Aes128Iv16(KeyInit::new_from_slice(key).map_err(invalid)?),
            (24, 16) => Self::Aes192Iv16(KeyInit::new_from_slice(key).map_err(invalid)?),
            (32, 16) => Self::Aes256Iv16(KeyInit::new_from_slice(key).map_err(invalid)?),
            (key_len, iv_len) => {
                return Err(CryptoError::configuration(format!(
                    "unsupported AES-GCM parameters: {key_len}-byte key, {iv_len}-byte IV"
                )));
            }
        };
        Ok(schedule)
    }

    fn seal(&self, iv: &[u8], buffer: &mut Vec<u8>) -> Result<(), CryptoError> {
        with_schedule!(self, gcm => gcm.encrypt_in_place(GenericArray::from_slice(iv), b"", buffer))
            .map_err(|_| CryptoError::Operation {
                reason: "AES-GCM encryption failed".to_string()
            })
    }

    fn open(&self, iv: &[u8], buffer: &mut Vec<u8>) -> Result<(), CryptoError> {
        with_schedule!(self, gcm => gcm.decrypt_in_place(GenericArray::from_slice(iv), b"", buffer))
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// Reusable, single-user AES-GCM working state.
///
/// Caches the key schedule of the last key it was used with and a scratch
/// buffer. Scratch contents are zeroed after every operation.
pub struct GcmCipher {
    iv_length: usize,
    schedule: Option<(u64, Schedule)>,
    buffer: Vec<u8>
}

impl GcmCipher {
    fn new(iv_length: usize) -> Self {
        Self {
            iv_length,
            schedule: None,
            buffer: Vec::new()
        }
    }

    fn prepare(&mut self, key: &SecretKeyMaterial) -> Result<(&Schedule, &mut Vec<u8>), CryptoError> {
        if !self.is_prepared_for(key) {
            self.schedule = Some((key.id(), Schedule::new(key.expose_bytes(), self.iv_length)?));
        }
        match self.schedule.as_ref() {
            Some((_, schedule)) => Ok((schedule, &mut self.buffer)),
            None => Err(CryptoError::Operation {
                reason: "cipher has no key schedule".to_string()
            })
        }
    }

    fn is_prepared_for(&self, key: &SecretKeyMaterial) -> bool {
        matches!(&self.schedule, Some((id, _)) if *id == key.id())
    }
}

/// AES-GCM engine with PBKDF2 key derivation.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Default [`CryptoEngine`]. Settings are validated once at construction;
/// invalid parameters fail fast with [`CryptoError::Configuration`].
///
/// ## Usage
/// ```rust,no_run
/// use crypto::{AesGcmEngine, CryptoEngine, CryptoSettings};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = AesGcmEngine::new(CryptoSettings::default().with_salt(b"salt".to_vec()))?;
///     let key = engine.create_secret_key("passphrase")?;
///     let mut cipher = engine.create_cipher()?;
///     let sealed = engine.encrypt("secret", &key, &mut cipher)?;
///     assert_eq!(engine.decrypt(&sealed, &key, &mut cipher)?, "secret");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AesGcmEngine {
    settings: CryptoSettings
}

impl AesGcmEngine {
    pub fn new(settings: CryptoSettings) -> Result<Self, CryptoError> {
        settings.resolve()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &CryptoSettings {
        &self.settings
    }
}

impl CryptoEngine for AesGcmEngine {
    type Cipher = GcmCipher;

    fn create_secret_key(&self, passphrase: &str) -> Result<SecretKeyMaterial, CryptoError> {
        derive_key(passphrase, &self.settings)
    }

    fn create_cipher(&self) -> Result<GcmCipher, CryptoError> {
        Ok(GcmCipher::new(self.settings.iv_length))
    }

    fn encrypt(
        &self,
        plaintext: &str,
        key: &SecretKeyMaterial,
        cipher: &mut GcmCipher
    ) -> Result<String, CryptoError> {
        let iv_length = cipher.iv_length;
        let (schedule, buffer) = cipher.prepare(key)?;

        let mut iv = vec![0u8; iv_length];
        OsRng.fill_bytes(&mut iv);

        buffer.clear();
        buffer.extend_from_slice(plaintext.as_bytes());
        let sealed = schedule.seal(&iv, buffer).map(|()| {
            let mut out = Vec::with_capacity(iv.len() + buffer.len());
            out.extend_from_slice(&iv);
            out.extend_from_slice(buffer);
            general_purpose::STANDARD.encode(out)
        });
        buffer.zeroize();
        sealed
    }

    fn decrypt(
        &self,
        ciphertext: &str,
        key: &SecretKeyMaterial,
        cipher: &mut GcmCipher
    ) -> Result<String, CryptoError> {
        let data = general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::MalformedCiphertext {
                reason: e.to_string()
            })?;

        let iv_length = cipher.iv_length;
        if data.len() < iv_length + self.settings.tag_length() {
            return Err(CryptoError::MalformedCiphertext {
                reason: format!("{} bytes is shorter than IV plus tag", data.len())
            });
        }

        let (schedule, buffer) = cipher.prepare(key)?;
        let (iv, body) = data.split_at(iv_length);
        buffer.clear();
        buffer.extend_from_slice(body);

        let opened = schedule.open(iv, buffer).and_then(|()| {
            String::from_utf8(buffer.clone()).map_err(|e| CryptoError::MalformedCiphertext {
                reason: format!("plaintext is not UTF-8: {e}")
            })
        });
        buffer.zeroize();
        opened
    }
}
