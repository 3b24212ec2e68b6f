//! Key amortization.
//!
//! [`KeyAmortizer`] wraps another [`DataKeyProvider`] and derives several data
//! keys from each key it obtains, so an expensive provider (a remote key
//! service, typically) is called once per `derivations_per_key` encryptions.
//!
//! Every derived key carries the wrapped form of its source key plus its
//! derivation index. Decryption unwraps the source key and derives again.

use crate::config::AmortizerConfig;
use crate::error::{Error, KeyProviderError};
use crate::kdf::{derive_subkey, AMORTIZER_CONTEXT};
use crate::key_provider::{DataKey, DataKeyProvider};
use async_trait::async_trait;
use secrecy::SecretVec;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Index assumed for envelopes written without one.
pub const LEGACY_KEY_INDEX: u32 = 1;

struct SourceKey {
    key: DataKey,
    used: u32,
}

/// A provider that derives up to `derivations_per_key` keys per source key.
///
/// # Example
///
/// ```rust
/// use fieldseal::amortizer::KeyAmortizer;
/// use fieldseal::config::AmortizerConfig;
/// use fieldseal::key_provider::FixedKeyProvider;
///
/// let amortizer = KeyAmortizer::new(FixedKeyProvider::random(), AmortizerConfig::new(100))
///     .expect("valid configuration");
/// assert_eq!(amortizer.derivations_per_key(), 100);
/// ```
pub struct KeyAmortizer<P> {
    provider: P,
    derivations_per_key: u32,
    source: Mutex<Option<SourceKey>>,
}

impl<P: DataKeyProvider> KeyAmortizer<P> {
    /// Wraps `provider`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `derivations_per_key` is zero.
    pub fn new(provider: P, config: AmortizerConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            provider,
            derivations_per_key: config.derivations_per_key,
            source: Mutex::new(None),
        })
    }

    /// Number of keys derived per source key.
    #[must_use]
    pub const fn derivations_per_key(&self) -> u32 {
        self.derivations_per_key
    }

    /// Returns the wrapped provider.
    #[must_use]
    pub const fn inner(&self) -> &P {
        &self.provider
    }
}

fn derive_at(source: &SecretVec<u8>, index: u32) -> Result<SecretVec<u8>, KeyProviderError> {
    derive_subkey(source, AMORTIZER_CONTEXT, u64::from(index))
        .map_err(|e| KeyProviderError::GenerationFailed(e.to_string()))
}

#[async_trait]
impl<P: DataKeyProvider> DataKeyProvider for KeyAmortizer<P> {
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
        // Held across the provider call: waiters reuse the new source key.
        let mut slot = self.source.lock().await;

        let source = match slot.take() {
            Some(source) if source.used < self.derivations_per_key => slot.insert(source),
            exhausted => {
                drop(exhausted);
                let key = self.provider.generate_data_key().await?;
                debug!(derivations_per_key = self.derivations_per_key, "rotated amortizer source key");
                slot.insert(SourceKey { key, used: 0 })
            }
        };

        source.used += 1;
        let index = source.used;
        let derived = derive_at(source.key.plaintext(), index)?;
        trace!(key_index = index, "derived data key");

        Ok(DataKey::new(derived, source.key.wrapped().to_vec()).with_key_index(index))
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        let source = self.provider.decrypt_data_key(wrapped, None).await?;
        derive_at(&source, key_index.unwrap_or(LEGACY_KEY_INDEX))
    }
}
