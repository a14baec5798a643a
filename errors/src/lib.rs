//! # Configuration Errors
//!
//! Error taxonomy for the layered configuration system.
//!
//! Follows Microsoft Pragmatic Rust Guidelines:
//! - Uses `thiserror` for structured error definitions
//! - Named fields in every message
//! - Absent values are never errors; they surface as `Option::None`

use thiserror::Error;

/// Errors raised by configuration nodes, sources and converters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot convert value of '{key}' to {target}: {reason}")]
    Conversion {
        key: String,
        target: String,
        reason: String
    },

    #[error("Value of '{key}' is not numeric: {value}")]
    Parse { key: String, value: String },

    #[error("No converter registered for {target}")]
    NoConverter { target: String },

    #[error("Source '{source_name}' cannot enumerate its keys")]
    EnumerationUnsupported { source_name: String },

    #[error("Backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Variable cycle detected: {}", chain.join(" -> "))]
    VariableCycle { chain: Vec<String> },

    #[error("Variable expansion of '{key}' exceeded depth {max_depth}")]
    VariableDepthExceeded { key: String, max_depth: usize },

    #[error("Configuration hierarchy depth {depth} exceeds maximum {max_depth}")]
    HierarchyTooDeep { depth: usize, max_depth: usize },

    #[error("Async runtime unavailable: {reason}")]
    Runtime { reason: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError)
}

impl ConfigError {
    /// Build a backend failure from any displayable cause.
    pub fn backend(backend: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.to_string()
        }
    }
}

/// Errors raised by key derivation, the cipher engine and the provider.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Crypto configuration invalid: {message}")]
    Configuration { message: String },

    /// The authentication tag did not verify: wrong key or tampered data.
    #[error("Authentication tag mismatch: wrong key or corrupted ciphertext")]
    AuthenticationFailed,

    #[error("Malformed ciphertext: {reason}")]
    MalformedCiphertext { reason: String },

    #[error("Cipher operation failed: {reason}")]
    Operation { reason: String },

    #[error("Crypto provider unavailable: {source}")]
    Provider {
        #[source]
        source: PoolError
    },

    #[error("Cipher pool is closed")]
    PoolClosed,

    /// Primary failure of an operation whose cipher could not be released
    /// afterwards either.
    #[error("{primary} (cipher release also failed: {suppressed})")]
    WithSuppressed {
        #[source]
        primary: Box<CryptoError>,
        suppressed: PoolError
    }
}

impl CryptoError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into()
        }
    }

    /// The error that caused the failure, ignoring any suppressed release error.
    pub fn primary(&self) -> &CryptoError {
        match self {
            Self::WithSuppressed { primary, .. } => primary.primary(),
            other => other
        }
    }

    /// Release failure recorded alongside the primary error, if any.
    pub fn suppressed(&self) -> Option<&PoolError> {
        match self {
            Self::WithSuppressed { suppressed, .. } => Some(suppressed),
            _ => None
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.primary(), Self::AuthenticationFailed)
    }

    pub fn is_pool_closed(&self) -> bool {
        matches!(self.primary(), Self::PoolClosed)
    }
}

/// Errors raised by the cipher pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every slot is borrowed; retrying later may succeed.
    #[error("Pool exhausted: all {max_total} ciphers are in use")]
    Exhausted { max_total: usize },

    #[error("Pool is closed")]
    Closed,

    #[error("Cipher factory failed: {reason}")]
    Factory { reason: String }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_suppressed_keeps_primary_as_source() {
        let err = CryptoError::WithSuppressed {
            primary: Box::new(CryptoError::AuthenticationFailed),
            suppressed: PoolError::Closed
        };

        assert!(err.is_authentication_failure());
        assert!(!err.is_pool_closed());
        assert_eq!(err.suppressed(), Some(&PoolError::Closed));
        assert!(err.source().unwrap().to_string().contains("Authentication"));
        assert!(err.to_string().contains("cipher release also failed"));
    }

    #[test]
    fn test_config_error_wraps_crypto() {
        let err: ConfigError = CryptoError::PoolClosed.into();
        assert!(matches!(err, ConfigError::Crypto(CryptoError::PoolClosed)));
        assert_eq!(err.to_string(), "Cipher pool is closed");
    }

    #[test]
    fn test_variable_cycle_message() {
        let err = ConfigError::VariableCycle {
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()]
        };
        assert_eq!(err.to_string(), "Variable cycle detected: a -> b -> a");
    }
}
