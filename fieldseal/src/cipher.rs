//! Field ciphers: authenticated encryption of selected record fields.
//!
//! Two interchangeable implementations of [`FieldCipher`] exist:
//!
//! - [`XChaChaCipher`] moves every selected field into one canonical object and
//!   seals it as a single XChaCha20-Poly1305 blob. The fields disappear from
//!   the visible record.
//! - [`LegacyXChaChaCipher`] replaces each selected field in place with its own
//!   ciphertext. It exists to produce and migrate the older per-field format.
//!
//! Both decrypt either shape. Neither holds state between calls; a fresh random
//! nonce is drawn for every encryption.

use crate::error::Error;
use crate::kdf::{derive_field_key, derive_purpose_key, KeyPurpose, KEY_SIZE};
use crate::record::{Record, Value};
use crate::selection::FieldSelection;
use crate::serialization::{from_canonical_bytes, to_canonical_bytes};
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use secrecy::{ExposeSecret, SecretVec};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Nonce size for XChaCha20-Poly1305 (192 bits).
pub const NONCE_SIZE: usize = 24;

/// Identifies the algorithm that produced an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionScheme {
    /// XChaCha20-Poly1305 with HKDF-SHA256 purpose keys.
    XChaCha20Poly1305,
}

impl EncryptionScheme {
    /// Numeric identifier written into envelope metadata.
    #[must_use]
    pub const fn id(self) -> u64 {
        match self {
            Self::XChaCha20Poly1305 => 0,
        }
    }

    /// Looks up a scheme by its numeric identifier.
    #[must_use]
    pub const fn from_id(id: u64) -> Option<Self> {
        match id {
            0 => Some(Self::XChaCha20Poly1305),
            _ => None,
        }
    }
}

/// Output of a field cipher, and input to its inverse.
#[derive(Debug, Clone, PartialEq)]
pub enum SealedFields {
    /// All selected fields sealed together; `remainder` holds the rest.
    Consolidated {
        /// Fields that were not selected (or were absent).
        remainder: Record,
        /// Nonce used for the blob.
        nonce: Vec<u8>,
        /// Authenticated ciphertext of the selected fields.
        ciphertext: Vec<u8>,
    },
    /// Each selected field replaced by its own ciphertext.
    PerField {
        /// The record with ciphertexts in place of the encrypted fields.
        record: Record,
        /// Nonce shared by the per-field ciphertexts.
        nonce: Vec<u8>,
        /// Names of the fields holding ciphertext.
        field_names: Vec<String>,
    },
}

/// Encrypts and decrypts the selected fields of a record.
pub trait FieldCipher: Send + Sync {
    /// The scheme this cipher writes.
    fn scheme(&self) -> EncryptionScheme;

    /// Encrypts the selected fields of `record` under `key`.
    ///
    /// Selected fields missing from the record are skipped. `Null` values are
    /// present and get encrypted.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKeyLength` for a key of the wrong size, or
    /// `Error::EncryptionFailed` / `Error::Serialization` if sealing fails.
    fn encrypt(
        &self,
        record: Record,
        fields: &FieldSelection,
        key: &SecretVec<u8>,
    ) -> Result<SealedFields, Error>;

    /// Reverses [`encrypt`](Self::encrypt) for either sealed shape.
    ///
    /// # Errors
    ///
    /// Returns `Error::AuthenticationFailed` if any ciphertext fails
    /// verification; no partially decrypted record is returned.
    fn decrypt(&self, sealed: SealedFields, key: &SecretVec<u8>) -> Result<Record, Error> {
        match sealed {
            SealedFields::Consolidated { remainder, nonce, ciphertext } => {
                open_consolidated(remainder, &nonce, &ciphertext, key)
            }
            SealedFields::PerField { record, nonce, field_names } => {
                open_per_field(record, &nonce, &field_names, key)
            }
        }
    }
}

/// Consolidated-blob cipher (current format).
#[derive(Debug, Clone, Copy, Default)]
pub struct XChaChaCipher;

impl FieldCipher for XChaChaCipher {
    fn scheme(&self) -> EncryptionScheme {
        EncryptionScheme::XChaCha20Poly1305
    }

    fn encrypt(
        &self,
        mut record: Record,
        fields: &FieldSelection,
        key: &SecretVec<u8>,
    ) -> Result<SealedFields, Error> {
        let encryption_key = encryption_key(key)?;

        let mut selected = BTreeMap::new();
        for name in fields.iter() {
            if let Some(value) = record.remove(name) {
                selected.insert(name.to_string(), value);
            }
        }

        let plaintext = Zeroizing::new(to_canonical_bytes(&Value::Object(selected))?);
        let nonce = random_nonce();
        let ciphertext = seal(&encryption_key, &nonce, &plaintext)?;

        Ok(SealedFields::Consolidated { remainder: record, nonce: nonce.to_vec(), ciphertext })
    }
}

/// Per-field cipher (legacy format).
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyXChaChaCipher;

impl FieldCipher for LegacyXChaChaCipher {
    fn scheme(&self) -> EncryptionScheme {
        EncryptionScheme::XChaCha20Poly1305
    }

    fn encrypt(
        &self,
        mut record: Record,
        fields: &FieldSelection,
        key: &SecretVec<u8>,
    ) -> Result<SealedFields, Error> {
        let encryption_key = encryption_key(key)?;
        let nonce = random_nonce();

        let mut field_names = Vec::new();
        for name in fields.iter() {
            let Some(value) = record.get_mut(name) else {
                continue;
            };
            // One key per field: the record nonce is shared across fields.
            let field_key = derive_field_key(&encryption_key, name)?;
            let plaintext = Zeroizing::new(to_canonical_bytes(value)?);
            *value = Value::Binary(seal(&field_key, &nonce, &plaintext)?);
            field_names.push(name.to_string());
        }

        Ok(SealedFields::PerField { record, nonce: nonce.to_vec(), field_names })
    }
}

fn open_consolidated(
    mut remainder: Record,
    nonce: &[u8],
    ciphertext: &[u8],
    key: &SecretVec<u8>,
) -> Result<Record, Error> {
    let encryption_key = encryption_key(key)?;
    let plaintext = open(&encryption_key, nonce, ciphertext)?;

    match from_canonical_bytes(&plaintext)? {
        Value::Object(fields) => {
            remainder.extend(fields);
            Ok(remainder)
        }
        _ => Err(Error::UnsupportedFormat("encrypted fields are not an object".to_string())),
    }
}

fn open_per_field(
    record: Record,
    nonce: &[u8],
    field_names: &[String],
    key: &SecretVec<u8>,
) -> Result<Record, Error> {
    let encryption_key = encryption_key(key)?;

    let mut decrypted = record;
    for name in field_names {
        let ciphertext = match decrypted.get(name) {
            None => continue,
            Some(Value::Binary(bytes)) => bytes,
            Some(_) => {
                return Err(Error::UnsupportedFormat(format!(
                    "field `{name}` does not hold a ciphertext"
                )))
            }
        };
        let field_key = derive_field_key(&encryption_key, name)?;
        let plaintext = open(&field_key, nonce, ciphertext)?;
        let value = from_canonical_bytes(&plaintext)?;
        decrypted.insert(name.clone(), value);
    }

    Ok(decrypted)
}

fn encryption_key(key: &SecretVec<u8>) -> Result<SecretVec<u8>, Error> {
    let len = key.expose_secret().len();
    if len != KEY_SIZE {
        return Err(Error::InvalidKeyLength { expected: KEY_SIZE, actual: len });
    }
    derive_purpose_key(key, KeyPurpose::Encryption)
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn seal(key: &SecretVec<u8>, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose_secret())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {e}")))?;

    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|e| Error::EncryptionFailed(format!("XChaCha20-Poly1305 encryption failed: {e}")))
}

fn open(key: &SecretVec<u8>, nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    if nonce.len() != NONCE_SIZE {
        return Err(Error::UnsupportedFormat(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose_secret())
        .map_err(|_| Error::AuthenticationFailed)?;

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| Error::AuthenticationFailed)
}
