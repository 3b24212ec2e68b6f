//! AWS KMS data key provider for `FieldSeal`.
//!
//! Data keys are generated with KMS `GenerateDataKey` and unwrapped with
//! `Decrypt`, so the master key never leaves KMS.
//!
//! # Example
//!
//! ```rust,no_run
//! use fieldseal::prelude::*;
//! use fieldseal_kms_aws::AwsKmsProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = AwsKmsProvider::with_key_id(
//!     "arn:aws:kms:us-east-1:123456789012:key/12345678-1234-1234-1234-123456789012"
//! ).await;
//!
//! // One KMS call per 100 encrypted records.
//! let provider = KeyAmortizer::new(provider, AmortizerConfig::new(100))?;
//! let vault = Vault::new(provider, XChaChaCipher);
//! # Ok(())
//! # }
//! ```
//!
//! # AWS Configuration
//!
//! The provider uses the AWS SDK's default credential chain:
//! - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
//! - AWS credentials file (~/.aws/credentials)
//! - IAM instance profile (for EC2)
//! - ECS task role
//! - Web identity token (for EKS)

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client as KmsClient;
use fieldseal::error::KeyProviderError;
use fieldseal::kdf::KEY_SIZE;
use fieldseal::key_provider::{DataKey, DataKeyProvider};
use secrecy::{ExposeSecret, SecretVec};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

const DATA_KEY_BYTES: i32 = 32;

/// Errors specific to AWS KMS operations.
#[derive(Debug, Error)]
pub enum AwsKmsError {
    /// The ciphertext blob is invalid or was produced under another key
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// The caller may not use the KMS key, or the key is disabled
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Key not found in KMS
    #[error("KMS key not found: {0}")]
    KeyNotFound(String),

    /// KMS answered without a required field
    #[error("KMS response missing {0}")]
    MissingField(&'static str),

    /// KMS returned a data key of the wrong size
    #[error("KMS returned a {0}-byte data key")]
    InvalidKeyLength(usize),

    /// Any other AWS KMS API error
    #[error("AWS KMS error: {0}")]
    KmsError(String),
}

impl AwsKmsError {
    /// Classifies a KMS error by its AWS error code.
    #[must_use]
    pub fn from_code(code: Option<&str>, message: String) -> Self {
        match code {
            Some("InvalidCiphertextException" | "IncorrectKeyException") => {
                Self::InvalidCiphertext(message)
            }
            Some("AccessDeniedException" | "DisabledException" | "InvalidGrantTokenException") => {
                Self::AccessDenied(message)
            }
            Some("NotFoundException") => Self::KeyNotFound(message),
            _ => Self::KmsError(message),
        }
    }

    fn from_sdk<E, R>(err: &SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        Self::from_code(err.code(), DisplayErrorContext(err).to_string())
    }
}

impl From<AwsKmsError> for KeyProviderError {
    fn from(err: AwsKmsError) -> Self {
        match err {
            AwsKmsError::InvalidCiphertext(msg) => Self::UnwrapFailed(msg),
            AwsKmsError::AccessDenied(msg) => Self::AccessDenied(msg),
            AwsKmsError::InvalidKeyLength(_) => Self::GenerationFailed(err.to_string()),
            AwsKmsError::KeyNotFound(_) | AwsKmsError::MissingField(_) | AwsKmsError::KmsError(_) => {
                Self::Unavailable(err.to_string())
            }
        }
    }
}

/// AWS KMS data key provider.
///
/// New data keys are generated under the current key ID. Decryption lets KMS
/// pick the key from the ciphertext blob, so rotating the key ID with
/// [`set_key_id`](Self::set_key_id) does not break existing envelopes.
pub struct AwsKmsProvider {
    /// AWS KMS client
    client: KmsClient,
    /// Current KMS key ID (ARN or alias)
    key_id: Arc<RwLock<String>>,
}

impl AwsKmsProvider {
    /// Creates a provider with a specific KMS key ID.
    ///
    /// Uses the AWS SDK's default credential and region resolution.
    ///
    /// # Arguments
    ///
    /// * `key_id` - KMS key ID, ARN, or alias (e.g., "alias/fieldseal")
    pub async fn with_key_id(key_id: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::with_client(KmsClient::new(&config), key_id)
    }

    /// Creates a provider from an existing KMS client.
    #[must_use]
    pub fn with_client(client: KmsClient, key_id: impl Into<String>) -> Self {
        Self { client, key_id: Arc::new(RwLock::new(key_id.into())) }
    }

    /// Returns the KMS key ID used for new data keys.
    pub async fn key_id(&self) -> String {
        self.key_id.read().await.clone()
    }

    /// Sets the KMS key ID used for new data keys.
    ///
    /// # Arguments
    ///
    /// * `key_id` - KMS key ID, ARN, or alias
    pub async fn set_key_id(&self, key_id: impl Into<String>) {
        let mut current = self.key_id.write().await;
        *current = key_id.into();
    }
}

fn into_secret_key(plaintext: Option<Blob>) -> Result<SecretVec<u8>, AwsKmsError> {
    let key = SecretVec::new(plaintext.ok_or(AwsKmsError::MissingField("Plaintext"))?.into_inner());
    match key.expose_secret().len() {
        KEY_SIZE => Ok(key),
        other => Err(AwsKmsError::InvalidKeyLength(other)),
    }
}

#[async_trait::async_trait]
impl DataKeyProvider for AwsKmsProvider {
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
        let key_id = self.key_id().await;
        let mut response = self
            .client
            .generate_data_key()
            .key_id(&key_id)
            .number_of_bytes(DATA_KEY_BYTES)
            .send()
            .await
            .map_err(|e| AwsKmsError::from_sdk(&e))?;

        let plaintext = into_secret_key(response.plaintext.take())?;
        let wrapped = response
            .ciphertext_blob
            .take()
            .ok_or(AwsKmsError::MissingField("CiphertextBlob"))?
            .into_inner();

        debug!(key_id = %key_id, "generated KMS data key");
        Ok(DataKey::new(plaintext, wrapped))
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        _key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        let mut response = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(wrapped))
            .send()
            .await
            .map_err(|e| AwsKmsError::from_sdk(&e))?;

        Ok(into_secret_key(response.plaintext.take())?)
    }
}
