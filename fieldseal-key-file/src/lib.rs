//! File-based data key provider for `FieldSeal`.
//!
//! A 32-byte master key stored in a local file wraps and unwraps data keys.
//! Suitable for development and testing environments, where it stands in for
//! a managed key service.

#![warn(clippy::pedantic, clippy::nursery)]

use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use fieldseal::error::KeyProviderError;
use fieldseal::kdf::KEY_SIZE;
use fieldseal::key_provider::{DataKey, DataKeyProvider};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretVec};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Name of the master key file inside the key directory.
pub const MASTER_KEY_FILE: &str = "master.key";

const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;
const WRAP_AAD: &[u8] = b"fieldseal/file-key-provider";

/// File-based data key provider for development and testing.
///
/// Keys are stored in the filesystem with the following structure:
/// ```text
/// keys/
/// └── master.key      (32 bytes, 0600 permissions)
/// ```
///
/// A wrapped data key is `nonce (24 bytes) || XChaCha20-Poly1305(master, data key)`.
pub struct FileKeyProvider {
    key_dir: PathBuf,
    master: SecretVec<u8>,
}

impl FileKeyProvider {
    /// Loads the master key from an existing key directory.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing `master.key`
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::Io` if the key file cannot be read or does
    /// not hold exactly 32 bytes.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        let path = key_dir.join(MASTER_KEY_FILE);
        let bytes = Zeroizing::new(fs::read(&path)?);
        if bytes.len() != KEY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} must hold {KEY_SIZE} bytes, found {}", path.display(), bytes.len()),
            )
            .into());
        }
        debug!(key_dir = %key_dir.display(), "loaded master key");
        Ok(Self { key_dir, master: SecretVec::new(bytes.to_vec()) })
    }

    /// Initializes a new key directory with a fresh master key and loads it.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::Io` if the directory cannot be created or a
    /// master key already exists there.
    pub fn init(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        fs::create_dir_all(&key_dir)?;

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut key[..]);
        write_new_secret_file(&key_dir.join(MASTER_KEY_FILE), &key[..])?;

        info!(key_dir = %key_dir.display(), "initialized key directory");
        Self::new(key_dir)
    }

    /// Returns the key directory.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    fn cipher(&self) -> Result<XChaCha20Poly1305, KeyProviderError> {
        XChaCha20Poly1305::new_from_slice(self.master.expose_secret())
            .map_err(|e| KeyProviderError::Unavailable(format!("invalid master key: {e}")))
    }
}

fn write_new_secret_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[async_trait]
impl DataKeyProvider for FileKeyProvider {
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
        let mut plaintext = vec![0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut plaintext);
        let plaintext = SecretVec::new(plaintext);

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()?
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload { msg: plaintext.expose_secret(), aad: WRAP_AAD },
            )
            .map_err(|e| KeyProviderError::GenerationFailed(format!("wrapping failed: {e}")))?;

        let mut wrapped = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wrapped.extend_from_slice(&nonce);
        wrapped.extend_from_slice(&ciphertext);
        Ok(DataKey::new(plaintext, wrapped))
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        _key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        if wrapped.len() < NONCE_SIZE + TAG_SIZE {
            return Err(KeyProviderError::UnwrapFailed(format!(
                "wrapped key too short: {} bytes",
                wrapped.len()
            )));
        }
        let (nonce, ciphertext) = wrapped.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()?
            .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: WRAP_AAD })
            .map_err(|_| {
                KeyProviderError::UnwrapFailed("wrapped key failed authentication".to_string())
            })?;
        Ok(SecretVec::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_master_key() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::init(dir.path().join("keys")).unwrap();

        let path = provider.key_dir().join(MASTER_KEY_FILE);
        assert_eq!(fs::read(&path).unwrap().len(), KEY_SIZE);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        FileKeyProvider::init(dir.path()).unwrap();
        let result = FileKeyProvider::init(dir.path());
        assert!(matches!(result, Err(KeyProviderError::Io(_))));
    }

    #[test]
    fn test_new_requires_valid_key_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(FileKeyProvider::new(dir.path()), Err(KeyProviderError::Io(_))));

        fs::write(dir.path().join(MASTER_KEY_FILE), [1u8; 16]).unwrap();
        assert!(matches!(FileKeyProvider::new(dir.path()), Err(KeyProviderError::Io(_))));
    }

    #[tokio::test]
    async fn test_wrap_unwrap_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::init(dir.path()).unwrap();

        let key = provider.generate_data_key().await.unwrap();
        assert_eq!(key.wrapped().len(), NONCE_SIZE + KEY_SIZE + TAG_SIZE);
        assert_ne!(
            &key.wrapped()[NONCE_SIZE..NONCE_SIZE + KEY_SIZE],
            key.plaintext().expose_secret().as_slice()
        );

        let unwrapped = provider.decrypt_data_key(key.wrapped(), None).await.unwrap();
        assert_eq!(unwrapped.expose_secret(), key.plaintext().expose_secret());
    }

    #[tokio::test]
    async fn test_reloaded_provider_unwraps_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let key = FileKeyProvider::init(dir.path()).unwrap().generate_data_key().await.unwrap();

        let reloaded = FileKeyProvider::new(dir.path()).unwrap();
        let unwrapped = reloaded.decrypt_data_key(key.wrapped(), None).await.unwrap();
        assert_eq!(unwrapped.expose_secret(), key.plaintext().expose_secret());
    }

    #[tokio::test]
    async fn test_tampered_or_foreign_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::init(dir.path().join("a")).unwrap();
        let other = FileKeyProvider::init(dir.path().join("b")).unwrap();
        let key = provider.generate_data_key().await.unwrap();

        let mut tampered = key.wrapped().to_vec();
        tampered[NONCE_SIZE] ^= 0x01;
        let result = provider.decrypt_data_key(&tampered, None).await;
        assert!(matches!(result, Err(KeyProviderError::UnwrapFailed(_))));

        let result = other.decrypt_data_key(key.wrapped(), None).await;
        assert!(matches!(result, Err(KeyProviderError::UnwrapFailed(_))));

        let result = provider.decrypt_data_key(&[0u8; 10], None).await;
        assert!(matches!(result, Err(KeyProviderError::UnwrapFailed(_))));
    }

    #[tokio::test]
    async fn test_data_keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileKeyProvider::init(dir.path()).unwrap();
        let first = provider.generate_data_key().await.unwrap();
        let second = provider.generate_data_key().await.unwrap();
        assert_ne!(first.plaintext().expose_secret(), second.plaintext().expose_secret());
        assert_ne!(first.wrapped(), second.wrapped());
    }
}
