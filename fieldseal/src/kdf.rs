//! Key derivation using HKDF (HMAC-based Key Derivation Function).
//!
//! Sub-keys are derived from a parent key with HKDF-SHA256. The `info`
//! parameter is a fixed context label followed by a big-endian integer index,
//! so the same `(key, label, index)` triple always yields the same sub-key and
//! different indexes or labels yield independent ones.

use crate::error::Error;
use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

/// Data key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Context label for sub-keys derived by the key amortizer.
pub const AMORTIZER_CONTEXT: &[u8] = b"fieldseal/amortized-data-key";

/// Context label for purpose-separated keys derived inside a field cipher.
pub const PURPOSE_CONTEXT: &[u8] = b"fieldseal/key-purpose";

/// Context label for per-field keys of the legacy per-field format.
pub const LEGACY_FIELD_CONTEXT: &[u8] = b"fieldseal/legacy-field";

/// What a purpose-derived key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyPurpose {
    /// Authenticated encryption of field values.
    Encryption = 1,
    /// Reserved for signing; never used to encrypt.
    Signing = 2,
}

/// Derives a sub-key of [`KEY_SIZE`] bytes from `key`.
///
/// # Arguments
///
/// * `key` - Parent key material
/// * `context` - Fixed label separating derivation domains
/// * `index` - Small integer selecting the sub-key within the domain
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the HKDF expansion fails.
///
/// # Example
///
/// ```
/// use fieldseal::kdf::{derive_subkey, AMORTIZER_CONTEXT};
/// use secrecy::SecretVec;
///
/// let key = SecretVec::new(vec![0u8; 32]);
/// let sub_key = derive_subkey(&key, AMORTIZER_CONTEXT, 1).expect("derivation failed");
/// ```
pub fn derive_subkey(
    key: &SecretVec<u8>,
    context: &[u8],
    index: u64,
) -> Result<SecretVec<u8>, Error> {
    derive_with_info(key, &[context, index.to_be_bytes().as_slice()])
}

/// Derives the key a cipher uses for `purpose`.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the HKDF expansion fails.
pub fn derive_purpose_key(
    key: &SecretVec<u8>,
    purpose: KeyPurpose,
) -> Result<SecretVec<u8>, Error> {
    derive_subkey(key, PURPOSE_CONTEXT, purpose as u64)
}

/// Derives the key protecting one named field in the legacy per-field format.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the HKDF expansion fails.
pub fn derive_field_key(key: &SecretVec<u8>, field_name: &str) -> Result<SecretVec<u8>, Error> {
    derive_with_info(key, &[LEGACY_FIELD_CONTEXT, field_name.as_bytes()])
}

fn derive_with_info(key: &SecretVec<u8>, info: &[&[u8]]) -> Result<SecretVec<u8>, Error> {
    let hkdf = Hkdf::<Sha256>::new(None, key.expose_secret());

    let mut okm = vec![0u8; KEY_SIZE];
    hkdf.expand_multi_info(info, &mut okm).map_err(|_| Error::KeyDerivation)?;

    Ok(SecretVec::new(okm))
}

/// Generates a random key from the OS CSPRNG.
///
/// # Example
///
/// ```
/// use fieldseal::kdf::generate_key;
/// use secrecy::ExposeSecret;
///
/// let key = generate_key();
/// assert_eq!(key.expose_secret().len(), 32);
/// ```
#[must_use]
pub fn generate_key() -> SecretVec<u8> {
    use chacha20poly1305::aead::{rand_core::RngCore, OsRng};

    let mut key = vec![0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    SecretVec::new(key)
}
