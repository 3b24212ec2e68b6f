//! Error types for `FieldSeal` operations.

use std::fmt;

/// Main error type for `FieldSeal` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external key service failed (generation, authorization, availability)
    #[error("key provider error: {0}")]
    KeyProvider(KeyProviderError),

    /// A wrapped data key could not be unwrapped (invalid or tampered)
    #[error("data key unwrap failed: {0}")]
    KeyUnwrap(String),

    /// Authentication tag verification failed (wrong key, corrupted or tampered ciphertext)
    #[error("authentication failed: ciphertext may be corrupted or tampered")]
    AuthenticationFailed,

    /// Envelope metadata matches neither the legacy nor the current shape
    #[error("unsupported envelope format: {0}")]
    UnsupportedFormat(String),

    /// Field selection is malformed or names a field outside the declared contract
    #[error("invalid field selection: {0}")]
    InvalidSelection(String),

    /// A record handed to encryption already carries the reserved metadata field
    #[error("record already contains reserved field `{0}`")]
    ReservedField(String),

    /// Key material has the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Canonical serialization or deserialization of field values failed
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Configuration values are out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<KeyProviderError> for Error {
    fn from(err: KeyProviderError) -> Self {
        match err {
            KeyProviderError::UnwrapFailed(msg) => Self::KeyUnwrap(msg),
            other => Self::KeyProvider(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors reported by a [`DataKeyProvider`](crate::key_provider::DataKeyProvider).
#[derive(Debug)]
pub enum KeyProviderError {
    /// Data key generation failed
    GenerationFailed(String),

    /// Wrapped data key is invalid, tampered or bound to another master key
    UnwrapFailed(String),

    /// Caller is not authorized to use the master key
    AccessDenied(String),

    /// The key service could not be reached or returned a transient failure
    Unavailable(String),

    /// The call did not complete within the configured deadline
    Timeout,

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerationFailed(msg) => write!(f, "data key generation failed: {msg}"),
            Self::UnwrapFailed(msg) => write!(f, "data key unwrap failed: {msg}"),
            Self::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            Self::Unavailable(msg) => write!(f, "key service unavailable: {msg}"),
            Self::Timeout => write!(f, "key service call timed out"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
