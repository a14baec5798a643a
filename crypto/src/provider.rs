//! # Crypto Provider
//!
//! Concurrency-safe `encrypt`/`decrypt` over a derived key and a pool of
//! cipher objects.

use crate::engine::{AesGcmEngine, CryptoEngine};
use crate::key::SecretKeyMaterial;
use crate::pool::{CipherPool, EngineCipherFactory, ObjectPool};
use crate::settings::{CryptoSettings, PoolSettings};
use errors::{CryptoError, PoolError};
use std::sync::Arc;

/// Encrypts and decrypts single values. Safe to call concurrently.
pub trait CryptoProvider: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// Provider that borrows a cipher for exactly one operation.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Derives the key once and reuses pooled cipher objects, so neither key
/// derivation nor cipher allocation happens per call.
///
/// ## Error Handling
/// - Pool exhaustion and cipher-creation failures become
///   [`CryptoError::Provider`].
/// - A closed pool surfaces as [`CryptoError::PoolClosed`], never wrapped.
/// - When the operation fails and releasing the cipher fails too, the
///   operation error is primary and the release error is kept in
///   [`CryptoError::WithSuppressed`].
///
/// ## Usage
/// ```rust,no_run
/// use crypto::{CryptoProvider, CryptoSettings, PoolSettings, PooledCryptoProvider};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let settings = CryptoSettings::default().with_salt(b"salt".to_vec());
///     let provider = PooledCryptoProvider::from_settings("passphrase", settings, PoolSettings::default())?;
///     let sealed = provider.encrypt("secret")?;
///     assert_eq!(provider.decrypt(&sealed)?, "secret");
///     Ok(())
/// }
/// ```
pub struct PooledCryptoProvider<E: CryptoEngine, P = CipherPool<<E as CryptoEngine>::Cipher>> {
    engine: Arc<E>,
    key: SecretKeyMaterial,
    pool: P
}

impl PooledCryptoProvider<AesGcmEngine> {
    /// AES-GCM provider built from crypto and pool settings.
    pub fn from_settings(
        passphrase: &str,
        settings: CryptoSettings,
        pool_settings: PoolSettings
    ) -> Result<Self, CryptoError> {
        Self::new(AesGcmEngine::new(settings)?, passphrase, pool_settings)
    }
}

impl<E: CryptoEngine + 'static> PooledCryptoProvider<E> {
    pub fn new(engine: E, passphrase: &str, pool_settings: PoolSettings) -> Result<Self, CryptoError> {
        let engine = Arc::new(engine);
        let key = engine.create_secret_key(passphrase)?;
        let pool = CipherPool::new(EngineCipherFactory::new(engine.clone()), pool_settings)?;
        Ok(Self { engine, key, pool })
    }
}

impl<E, P> PooledCryptoProvider<E, P>
where
    E: CryptoEngine,
    P: ObjectPool<E::Cipher>
{
    /// Assemble a provider from parts, e.g. a custom pool.
    pub fn with_pool(engine: Arc<E>, key: SecretKeyMaterial, pool: P) -> Self {
        Self { engine, key, pool }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn key(&self) -> &SecretKeyMaterial {
        &self.key
    }

    fn with_cipher<R>(
        &self,
        op: impl FnOnce(&E, &SecretKeyMaterial, &mut E::Cipher) -> Result<R, CryptoError>
    ) -> Result<R, CryptoError> {
        let mut cipher = self.pool.acquire().map_err(pool_failure)?;
        let outcome = op(self.engine.as_ref(), &self.key, &mut cipher);
        let released = self.pool.release(cipher);

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(pool_failure(release_err)),
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(suppressed)) => {
                tracing::warn!(error = %suppressed, "Cipher release failed after operation error");
                Err(CryptoError::WithSuppressed {
                    primary: Box::new(primary),
                    suppressed
                })
            }
        }
    }
}

fn pool_failure(err: PoolError) -> CryptoError {
    match err {
        PoolError::Closed => CryptoError::PoolClosed,
        other => CryptoError::Provider { source: other }
    }
}

impl<E, P> CryptoProvider for PooledCryptoProvider<E, P>
where
    E: CryptoEngine,
    P: ObjectPool<E::Cipher>
{
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.with_cipher(|engine, key, cipher| engine.encrypt(plaintext, key, cipher))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        self.with_cipher(|engine, key, cipher| engine.decrypt(ciphertext, key, cipher))
    }
}
