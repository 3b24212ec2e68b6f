//! # `FieldSeal`
//!
//! Field-level envelope encryption for structured records.
//!
//! Given a record and a set of field names, `FieldSeal` encrypts only those
//! fields with a data key from a pluggable key provider and stores everything
//! needed to decrypt them (wrapped data key, nonce, format version) inside the
//! record itself.
//!
//! ## Features
//!
//! - XChaCha20-Poly1305 over a canonical serialization of the selected fields
//! - Envelope encryption with provider-wrapped data keys
//! - Data key reuse policy and HKDF key amortization to cut provider calls
//! - Backward-compatible decryption of the legacy per-field format
//! - Type contracts for field selections via `#[derive(FieldContract)]`
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldseal::prelude::*;
//! use fieldseal_key_file::FileKeyProvider;
//!
//! let provider = KeyAmortizer::new(FileKeyProvider::new("./keys")?, AmortizerConfig::new(100))?;
//! let vault = Vault::new(provider, XChaChaCipher);
//!
//! let fields = FieldSelection::new(["accountNumber", "balance"])?;
//! let encrypted = vault.encrypt_item(record, &fields).await?;
//! let decrypted = vault.decrypt_item(encrypted).await?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod amortizer;
pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod key_provider;
mod key_slot;
pub mod record;
pub mod selection;
pub mod serialization;
pub mod vault;

pub use selection::FieldContract;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::amortizer::KeyAmortizer;
    pub use crate::cipher::{FieldCipher, LegacyXChaChaCipher, XChaChaCipher};
    pub use crate::config::{AmortizerConfig, VaultConfig};
    pub use crate::error::{Error, KeyProviderError};
    pub use crate::key_provider::{DataKey, DataKeyProvider, FixedKeyProvider};
    pub use crate::record::{Record, Value};
    pub use crate::selection::{FieldContract, FieldSelection};
    pub use crate::vault::{ItemToEncrypt, Vault};
}
