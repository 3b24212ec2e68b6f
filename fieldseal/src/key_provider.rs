//! Data key provider abstraction.
//!
//! A [`DataKeyProvider`] hands out fresh data keys together with their wrapped
//! (master-key encrypted) form, and unwraps previously issued keys. The core
//! only depends on this trait; concrete backends live in their own crates.

use crate::error::{Error, KeyProviderError};
use crate::kdf::{generate_key, KEY_SIZE};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretVec};
use std::fmt;
use std::sync::Arc;

/// A symmetric data key and its wrapped form.
///
/// The plaintext bytes are zeroed when the key is dropped. The wrapped bytes
/// are opaque and safe to persist.
pub struct DataKey {
    plaintext: SecretVec<u8>,
    wrapped: Vec<u8>,
    key_index: Option<u32>,
}

impl DataKey {
    /// Creates a data key without a key index.
    #[must_use]
    pub fn new(plaintext: SecretVec<u8>, wrapped: Vec<u8>) -> Self {
        Self { plaintext, wrapped, key_index: None }
    }

    /// Tags the key with the index it was derived at.
    #[must_use]
    pub const fn with_key_index(mut self, key_index: u32) -> Self {
        self.key_index = Some(key_index);
        self
    }

    /// Returns the plaintext key material.
    #[must_use]
    pub const fn plaintext(&self) -> &SecretVec<u8> {
        &self.plaintext
    }

    /// Returns the wrapped key.
    #[must_use]
    pub fn wrapped(&self) -> &[u8] {
        &self.wrapped
    }

    /// Returns the derivation index, if the key was derived.
    #[must_use]
    pub const fn key_index(&self) -> Option<u32> {
        self.key_index
    }

    /// Copies the key into an independently owned (and independently zeroed) value.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            plaintext: SecretVec::new(self.plaintext.expose_secret().clone()),
            wrapped: self.wrapped.clone(),
            key_index: self.key_index,
        }
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"[REDACTED]")
            .field("wrapped_len", &self.wrapped.len())
            .field("key_index", &self.key_index)
            .finish()
    }
}

/// Produces and unwraps data keys.
///
/// Implementations must be thread-safe (`Send + Sync`) so a single provider can
/// serve concurrent encrypt and decrypt calls. Providers must not cache keys:
/// every [`generate_data_key`](Self::generate_data_key) call returns
/// independent key material. Retries, if any, belong to the implementation.
///
/// # Example
///
/// ```rust,ignore
/// use fieldseal::key_provider::{DataKey, DataKeyProvider};
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl DataKeyProvider for MyProvider {
///     async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
///         // Implementation
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait DataKeyProvider: Send + Sync {
    /// Generates a fresh data key and its wrapped form.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError` when the key service fails or denies access.
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError>;

    /// Unwraps a previously issued data key.
    ///
    /// # Arguments
    ///
    /// * `wrapped` - The wrapped key as stored in an envelope
    /// * `key_index` - The derivation index recorded alongside it, if any
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::UnwrapFailed` if the wrapped bytes are invalid
    /// or tampered, or another variant if the key service fails.
    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError>;
}

#[async_trait]
impl<P: DataKeyProvider + ?Sized> DataKeyProvider for Arc<P> {
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
        (**self).generate_data_key().await
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        (**self).decrypt_data_key(wrapped, key_index).await
    }
}

/// A provider that always returns the same key, unwrapped.
///
/// The "wrapped" form is the plaintext key itself. Intended for tests and
/// local experiments only.
pub struct FixedKeyProvider {
    key: SecretVec<u8>,
}

impl FixedKeyProvider {
    /// Creates a provider around a fixed 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKeyLength` if the key is not [`KEY_SIZE`] bytes.
    pub fn new(key: Vec<u8>) -> Result<Self, Error> {
        if key.len() != KEY_SIZE {
            return Err(Error::InvalidKeyLength { expected: KEY_SIZE, actual: key.len() });
        }
        Ok(Self { key: SecretVec::new(key) })
    }

    /// Creates a provider around a freshly generated random key.
    #[must_use]
    pub fn random() -> Self {
        Self { key: generate_key() }
    }
}

#[async_trait]
impl DataKeyProvider for FixedKeyProvider {
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
        let bytes = self.key.expose_secret().clone();
        Ok(DataKey::new(SecretVec::new(bytes.clone()), bytes))
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        _key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        if wrapped.len() != KEY_SIZE {
            return Err(KeyProviderError::UnwrapFailed(format!(
                "expected {KEY_SIZE} key bytes, got {}",
                wrapped.len()
            )));
        }
        Ok(SecretVec::new(wrapped.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_provider_rejects_short_key() {
        let result = FixedKeyProvider::new(vec![1u8; 16]);
        assert!(matches!(result, Err(Error::InvalidKeyLength { expected: 32, actual: 16 })));
    }

    #[tokio::test]
    async fn test_fixed_provider_round_trip() {
        let provider = FixedKeyProvider::new(vec![7u8; 32]).unwrap();
        let key = provider.generate_data_key().await.unwrap();

        assert_eq!(key.plaintext().expose_secret(), &vec![7u8; 32]);
        assert_eq!(key.wrapped(), &[7u8; 32]);
        assert_eq!(key.key_index(), None);

        let unwrapped = provider.decrypt_data_key(key.wrapped(), None).await.unwrap();
        assert_eq!(unwrapped.expose_secret(), key.plaintext().expose_secret());
    }

    #[tokio::test]
    async fn test_fixed_provider_rejects_malformed_wrapped_key() {
        let provider = FixedKeyProvider::random();
        let result = provider.decrypt_data_key(&[1, 2, 3], None).await;
        assert!(matches!(result, Err(KeyProviderError::UnwrapFailed(_))));
    }

    #[tokio::test]
    async fn test_arc_provider_delegates() {
        let provider = Arc::new(FixedKeyProvider::random());
        let shared = Arc::clone(&provider);
        let key = shared.generate_data_key().await.unwrap();
        let direct = provider.generate_data_key().await.unwrap();
        assert_eq!(key.plaintext().expose_secret(), direct.plaintext().expose_secret());
    }

    #[test]
    fn test_data_key_debug_is_redacted() {
        let key = DataKey::new(SecretVec::new(vec![0xAB; 32]), vec![1, 2]).with_key_index(3);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_duplicate_is_independent_copy() {
        let key = DataKey::new(SecretVec::new(vec![9u8; 32]), vec![4, 5]).with_key_index(2);
        let copy = key.duplicate();
        drop(key);
        assert_eq!(copy.plaintext().expose_secret(), &vec![9u8; 32]);
        assert_eq!(copy.wrapped(), &[4, 5]);
        assert_eq!(copy.key_index(), Some(2));
    }
}
