//! Vault for record encryption and decryption.
//!
//! The Vault is the entry point of the crate. It obtains data keys from a
//! [`DataKeyProvider`], applies the data key reuse policy, runs the injected
//! [`FieldCipher`] and writes or reads the envelope metadata.

use crate::cipher::{FieldCipher, XChaChaCipher};
use crate::config::VaultConfig;
use crate::envelope::{self, METADATA_FIELD};
use crate::error::{Error, KeyProviderError};
use crate::key_provider::{DataKey, DataKeyProvider};
use crate::key_slot::KeySlot;
use crate::record::{Record, Value};
use crate::selection::{FieldContract, FieldSelection};
use futures_util::future::try_join_all;
use secrecy::SecretVec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// One record of a batch together with the fields to encrypt in it.
#[derive(Debug, Clone)]
pub struct ItemToEncrypt {
    /// The plaintext record.
    pub record: Record,
    /// Fields of `record` to encrypt.
    pub fields: FieldSelection,
}

impl ItemToEncrypt {
    /// Pairs a record with its field selection.
    #[must_use]
    pub const fn new(record: Record, fields: FieldSelection) -> Self {
        Self { record, fields }
    }
}

struct Inner<P, C> {
    provider: P,
    cipher: C,
    slot: KeySlot,
    provider_timeout: Option<Duration>,
}

/// Vault for encryption and decryption operations.
///
/// The Vault uses envelope encryption:
/// 1. Obtain a data key from the provider (or reuse the cached one)
/// 2. Encrypt the selected fields with the data key
/// 3. Store the wrapped data key, nonce and ciphertext in the record's
///    `__fieldseal__metadata` field
///
/// Cloning is cheap; clones share the provider and the cached data key.
///
/// # Example
///
/// ```rust
/// use fieldseal::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Error> {
/// let vault = Vault::new(FixedKeyProvider::random(), XChaChaCipher);
///
/// let mut record = Record::new();
/// record.insert("pk".to_string(), Value::from("account-123"));
/// record.insert("balance".to_string(), Value::from(100));
///
/// let fields = FieldSelection::new(["balance"])?;
/// let encrypted = vault.encrypt_item(record.clone(), &fields).await?;
/// assert!(!encrypted.contains_key("balance"));
///
/// let decrypted = vault.decrypt_item(encrypted).await?;
/// assert_eq!(decrypted, record);
/// # Ok(())
/// # }
/// ```
pub struct Vault<P, C = XChaChaCipher> {
    inner: Arc<Inner<P, C>>,
}

impl<P: DataKeyProvider, C: FieldCipher> Vault<P, C> {
    /// Creates a Vault with the default configuration (one data key per record).
    ///
    /// # Arguments
    ///
    /// * `provider` - Source of data keys
    /// * `cipher` - Field cipher; also selects the envelope format written
    pub fn new(provider: P, cipher: C) -> Self {
        let config = VaultConfig::default();
        Self::build(provider, cipher, &config)
    }

    /// Creates a Vault with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration fails validation.
    pub fn with_config(provider: P, cipher: C, config: VaultConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::build(provider, cipher, &config))
    }

    fn build(provider: P, cipher: C, config: &VaultConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                cipher,
                slot: KeySlot::new(config.max_uses_per_data_key),
                provider_timeout: config.provider_timeout(),
            }),
        }
    }

    /// Encrypts the selected fields of a record.
    ///
    /// Selected fields missing from the record are skipped. The result holds
    /// the unselected fields in plaintext plus the envelope metadata.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The record already contains the reserved metadata field
    /// - The key provider fails or times out
    /// - Serialization or encryption fails
    pub async fn encrypt_item(
        &self,
        record: Record,
        fields: &FieldSelection,
    ) -> Result<Record, Error> {
        if record.contains_key(METADATA_FIELD) {
            return Err(Error::ReservedField(METADATA_FIELD.to_string()));
        }

        let key = self.acquire_data_key().await?;
        trace!(fields = fields.len(), key_index = ?key.key_index(), "encrypting record");

        let cipher = &self.inner.cipher;
        let sealed = cipher.encrypt(record, fields, key.plaintext())?;
        envelope::assemble(sealed, cipher.scheme(), key.wrapped().to_vec(), key.key_index())
    }

    /// Encrypts a batch of records, preserving order.
    ///
    /// Every item goes through [`encrypt_item`](Self::encrypt_item), so items
    /// may share a data key when the reuse policy allows it.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; no partial results are returned.
    pub async fn encrypt_items(&self, items: Vec<ItemToEncrypt>) -> Result<Vec<Record>, Error> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        debug!(items = items.len(), "encrypting batch");

        try_join_all(
            items
                .into_iter()
                .map(|item| async move { self.encrypt_item(item.record, &item.fields).await }),
        )
        .await
    }

    /// Decrypts a record produced by `encrypt_item`, in either envelope format.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The metadata is missing or malformed (`UnsupportedFormat`)
    /// - The data key cannot be unwrapped (`KeyUnwrap`)
    /// - The ciphertext fails authentication (`AuthenticationFailed`)
    pub async fn decrypt_item(&self, record: Record) -> Result<Record, Error> {
        let (metadata, remainder) = envelope::parse(record)?;
        debug!(format = metadata.format_name(), "detected envelope format");

        let cipher = &self.inner.cipher;
        if metadata.scheme() != cipher.scheme() {
            return Err(Error::UnsupportedFormat(format!(
                "scheme {:?} does not match cipher scheme {:?}",
                metadata.scheme(),
                cipher.scheme()
            )));
        }

        let key = self.unwrap_data_key(metadata.encrypted_data_key(), metadata.key_index()).await?;
        cipher.decrypt(envelope::into_sealed(metadata, remainder), &key)
    }

    /// Decrypts a batch of records, preserving order.
    ///
    /// An empty batch returns immediately without contacting the provider.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; no partial results are returned.
    pub async fn decrypt_items(&self, records: Vec<Record>) -> Result<Vec<Record>, Error> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        debug!(items = records.len(), "decrypting batch");

        try_join_all(records.into_iter().map(|record| self.decrypt_item(record))).await
    }

    /// Encrypts a typed record whose fields are declared by [`FieldContract`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSelection` if `fields` names a field `T` does
    /// not declare, `Error::Serialization` if `T` does not serialize to an
    /// object, or any error of [`encrypt_item`](Self::encrypt_item).
    pub async fn encrypt_typed<T>(&self, item: &T, fields: &FieldSelection) -> Result<Record, Error>
    where
        T: Serialize + FieldContract,
    {
        fields.check_contract(T::FIELDS)?;
        match Value::from_json(serde_json::to_value(item)?) {
            Value::Object(record) => self.encrypt_item(record, fields).await,
            _ => Err(Error::Serialization("record type must serialize to an object".to_string())),
        }
    }

    /// Decrypts a record and deserializes it into `T`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`decrypt_item`](Self::decrypt_item), or
    /// `Error::Serialization` if the plaintext does not match `T`.
    pub async fn decrypt_typed<T: DeserializeOwned>(&self, record: Record) -> Result<T, Error> {
        let decrypted = self.decrypt_item(record).await?;
        Ok(serde_json::from_value(Value::Object(decrypted).into_json())?)
    }

    async fn acquire_data_key(&self) -> Result<DataKey, Error> {
        let provider = &self.inner.provider;
        let key = self
            .inner
            .slot
            .acquire(|| self.call_provider(provider.generate_data_key()))
            .await?;
        Ok(key)
    }

    async fn unwrap_data_key(
        &self,
        wrapped: &[u8],
        key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, Error> {
        let provider = &self.inner.provider;
        Ok(self.call_provider(provider.decrypt_data_key(wrapped, key_index)).await?)
    }

    async fn call_provider<T, F>(&self, call: F) -> Result<T, KeyProviderError>
    where
        F: Future<Output = Result<T, KeyProviderError>>,
    {
        match self.inner.provider_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(KeyProviderError::Timeout)),
            None => call.await,
        }
    }
}

impl<P, C> Clone for Vault<P, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::LegacyXChaChaCipher;
    use crate::kdf::generate_key;
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Mock key provider for testing: wraps data keys by XOR with a fixed KEK.
    #[derive(Default)]
    struct MockKeyProvider {
        issued: AtomicUsize,
        unwrapped: AtomicUsize,
    }

    const KEK: u8 = 42;

    #[async_trait]
    impl DataKeyProvider for MockKeyProvider {
        async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            let key = generate_key();
            let wrapped = key.expose_secret().iter().map(|b| b ^ KEK).collect();
            Ok(DataKey::new(key, wrapped))
        }

        async fn decrypt_data_key(
            &self,
            wrapped: &[u8],
            _key_index: Option<u32>,
        ) -> Result<SecretVec<u8>, KeyProviderError> {
            self.unwrapped.fetch_add(1, Ordering::SeqCst);
            Ok(SecretVec::new(wrapped.iter().map(|b| b ^ KEK).collect()))
        }
    }

    fn account() -> Record {
        Record::from([
            ("pk".to_string(), Value::from("account-123")),
            ("sk".to_string(), Value::from("Flava Flav")),
            ("accountNumber".to_string(), Value::from("123")),
            ("balance".to_string(), Value::from(100)),
        ])
    }

    fn selection() -> FieldSelection {
        FieldSelection::new(["accountNumber", "balance"]).unwrap()
    }

    #[tokio::test]
    async fn test_vault_encrypt_decrypt_round_trip() {
        let vault = Vault::new(MockKeyProvider::default(), XChaChaCipher);
        let encrypted = vault.encrypt_item(account(), &selection()).await.expect("Encryption failed");

        assert!(encrypted.contains_key(METADATA_FIELD));
        assert!(!encrypted.contains_key("balance"));
        assert_eq!(encrypted.get("pk"), Some(&Value::from("account-123")));

        let decrypted = vault.decrypt_item(encrypted).await.expect("Decryption failed");
        assert_eq!(decrypted, account());
    }

    #[tokio::test]
    async fn test_vault_legacy_cipher_round_trip() {
        let vault = Vault::new(MockKeyProvider::default(), LegacyXChaChaCipher);
        let encrypted = vault.encrypt_item(account(), &selection()).await.unwrap();

        assert!(encrypted.get("balance").and_then(Value::as_binary).is_some());
        assert_eq!(vault.decrypt_item(encrypted).await.unwrap(), account());
    }

    #[tokio::test]
    async fn test_vault_default_policy_uses_fresh_keys() {
        let vault = Vault::new(MockKeyProvider::default(), XChaChaCipher);
        vault.encrypt_item(account(), &selection()).await.unwrap();
        vault.encrypt_item(account(), &selection()).await.unwrap();
        assert_eq!(vault.inner.provider.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_vault_reserved_field_rejected_before_key_acquisition() {
        let vault = Vault::new(MockKeyProvider::default(), XChaChaCipher);
        let mut record = account();
        record.insert(METADATA_FIELD.to_string(), Value::Null);

        let result = vault.encrypt_item(record, &selection()).await;
        assert!(matches!(result, Err(Error::ReservedField(_))));
        assert_eq!(vault.inner.provider.issued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_vault_plain_record_is_unsupported() {
        let vault = Vault::new(MockKeyProvider::default(), XChaChaCipher);
        let result = vault.decrypt_item(account()).await;
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
        assert_eq!(vault.inner.provider.unwrapped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_vault_tampered_wrapped_key_fails_authentication() {
        let vault = Vault::new(MockKeyProvider::default(), XChaChaCipher);
        let mut encrypted = vault.encrypt_item(account(), &selection()).await.unwrap();

        let Some(Value::Object(metadata)) = encrypted.get_mut(METADATA_FIELD) else {
            panic!("metadata missing");
        };
        let Some(Value::Binary(wrapped)) = metadata.get_mut("encryptedDataKey") else {
            panic!("wrapped key missing");
        };
        wrapped[0] ^= 0xFF;

        let result = vault.decrypt_item(encrypted).await;
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_vault_empty_batches() {
        let vault = Vault::new(MockKeyProvider::default(), XChaChaCipher);
        assert!(vault.encrypt_items(Vec::new()).await.unwrap().is_empty());
        assert!(vault.decrypt_items(Vec::new()).await.unwrap().is_empty());
        assert_eq!(vault.inner.provider.issued.load(Ordering::SeqCst), 0);
        assert_eq!(vault.inner.provider.unwrapped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_vault_invalid_config_rejected() {
        let config = VaultConfig { max_uses_per_data_key: 0, provider_timeout_ms: None };
        let result = Vault::with_config(MockKeyProvider::default(), XChaChaCipher, config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_vault_clone() {
        let config = VaultConfig { max_uses_per_data_key: 2, provider_timeout_ms: None };
        let vault1 = Vault::with_config(MockKeyProvider::default(), XChaChaCipher, config).unwrap();
        let vault2 = vault1.clone();

        let encrypted = vault1.encrypt_item(account(), &selection()).await.unwrap();
        vault2.encrypt_item(account(), &selection()).await.unwrap();
        // Clones share the cached key.
        assert_eq!(vault1.inner.provider.issued.load(Ordering::SeqCst), 1);

        assert_eq!(vault2.decrypt_item(encrypted).await.unwrap(), account());
    }
}
