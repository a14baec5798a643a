//! Passphrase key derivation.

use crate::settings::{CryptoSettings, KdfAlgorithm, KeyAlgorithm};
use errors::CryptoError;
use sha2::{Sha256, Sha512};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use zeroize::Zeroizing;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Parameters a key was derived with. Contains no secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDerivationParams {
    pub kdf_algorithm: KdfAlgorithm,
    pub key_algorithm: KeyAlgorithm,
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub key_length_bits: u32
}

/// Derived symmetric key plus the parameters that produced it.
///
/// Immutable once created. The key bytes are zeroed on drop and never
/// appear in `Debug` output.
#[derive(Clone)]
pub struct SecretKeyMaterial {
    id: u64,
    bytes: Zeroizing<Vec<u8>>,
    params: KeyDerivationParams
}

impl SecretKeyMaterial {
    /// Process-unique identity, shared by clones of the same key.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &KeyDerivationParams {
        &self.params
    }

    pub fn expose_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

/// Derive a key from `passphrase` with PBKDF2.
///
/// Identical passphrase, salt, iteration count, key length and algorithm
/// always yield identical key bytes.
pub fn derive_key(passphrase: &str, settings: &CryptoSettings) -> Result<SecretKeyMaterial, CryptoError> {
    let algorithms = settings.resolve()?;
    let salt = settings
        .salt
        .clone()
        .ok_or_else(|| CryptoError::configuration("salt is required"))?;

    let mut bytes = Zeroizing::new(vec![0u8; settings.key_length()]);
    match algorithms.kdf {
        KdfAlgorithm::Pbkdf2HmacSha256 => pbkdf2::pbkdf2_hmac::<Sha256>(
            passphrase.as_bytes(),
            &salt,
            settings.iterations,
            bytes.as_mut_slice()
        ),
        KdfAlgorithm::Pbkdf2HmacSha512 => pbkdf2::pbkdf2_hmac::<Sha512>(
            passphrase.as_bytes(),
            &salt,
            settings.iterations,
            bytes.as_mut_slice()
        )
    }

    tracing::debug!(
        kdf = %algorithms.kdf,
        iterations = settings.iterations,
        key_length_bits = settings.key_length_bits,
        "Derived secret key"
    );

    Ok(SecretKeyMaterial {
        id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
        bytes,
        params: KeyDerivationParams {
            kdf_algorithm: algorithms.kdf,
            key_algorithm: algorithms.key,
            salt,
            iterations: settings.iterations,
            key_length_bits: settings.key_length_bits
        }
    })
}
