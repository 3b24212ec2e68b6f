//! Envelope metadata format.
//!
//! An encrypted record is a regular [`Record`] carrying one reserved field,
//! [`METADATA_FIELD`], whose object value describes how to decrypt it:
//!
//! ```text
//! current (V1): { metadataVersion: 1, scheme, nonce, encryptedDataKey, keyIndex?, encryptedFields }
//! legacy:       { scheme, nonce, encryptedDataKey, keyIndex?, encryptedFieldNames: [..] }
//! ```
//!
//! The two shapes are told apart by which of `encryptedFields` and
//! `encryptedFieldNames` is present; no outside version hint is needed.

use crate::cipher::{EncryptionScheme, SealedFields};
use crate::error::Error;
use crate::record::{Record, Value};
use std::collections::BTreeMap;

/// Reserved record field holding envelope metadata.
pub const METADATA_FIELD: &str = "__fieldseal__metadata";

/// Version tag of the consolidated format.
pub const METADATA_VERSION_V1: u64 = 1;

const VERSION_KEY: &str = "metadataVersion";
const SCHEME_KEY: &str = "scheme";
const NONCE_KEY: &str = "nonce";
const DATA_KEY_KEY: &str = "encryptedDataKey";
const KEY_INDEX_KEY: &str = "keyIndex";
const BLOB_KEY: &str = "encryptedFields";
const FIELD_NAMES_KEY: &str = "encryptedFieldNames";

/// Metadata of the legacy per-field format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMetadata {
    /// Scheme that produced the ciphertexts.
    pub scheme: EncryptionScheme,
    /// Nonce shared by the field ciphertexts.
    pub nonce: Vec<u8>,
    /// Wrapped data key.
    pub encrypted_data_key: Vec<u8>,
    /// Derivation index of the data key, if it was derived.
    pub key_index: Option<u32>,
    /// Fields that hold ciphertext in place.
    pub encrypted_field_names: Vec<String>,
}

/// Metadata of the consolidated V1 format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV1 {
    /// Scheme that produced the blob.
    pub scheme: EncryptionScheme,
    /// Nonce of the blob.
    pub nonce: Vec<u8>,
    /// Wrapped data key.
    pub encrypted_data_key: Vec<u8>,
    /// Derivation index of the data key, if it was derived.
    pub key_index: Option<u32>,
    /// Ciphertext of all encrypted fields.
    pub encrypted_fields: Vec<u8>,
}

/// Envelope metadata, one variant per on-wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeMetadata {
    /// Per-field ciphertexts, identified by `encryptedFieldNames`.
    Legacy(LegacyMetadata),
    /// One consolidated blob, identified by `encryptedFields`.
    V1(MetadataV1),
}

impl EnvelopeMetadata {
    /// Returns the scheme recorded in the metadata.
    #[must_use]
    pub const fn scheme(&self) -> EncryptionScheme {
        match self {
            Self::Legacy(meta) => meta.scheme,
            Self::V1(meta) => meta.scheme,
        }
    }

    /// Returns the wrapped data key.
    #[must_use]
    pub fn encrypted_data_key(&self) -> &[u8] {
        match self {
            Self::Legacy(meta) => &meta.encrypted_data_key,
            Self::V1(meta) => &meta.encrypted_data_key,
        }
    }

    /// Returns the data key derivation index, if any.
    #[must_use]
    pub const fn key_index(&self) -> Option<u32> {
        match self {
            Self::Legacy(meta) => meta.key_index,
            Self::V1(meta) => meta.key_index,
        }
    }

    /// Short name of the format, for logs.
    #[must_use]
    pub const fn format_name(&self) -> &'static str {
        match self {
            Self::Legacy(_) => "legacy",
            Self::V1(_) => "v1",
        }
    }

    /// Writes the metadata as a record value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        let (scheme, nonce, data_key, key_index) = match self {
            Self::Legacy(meta) => {
                let names = meta.encrypted_field_names.iter().cloned().map(Value::String).collect();
                map.insert(FIELD_NAMES_KEY.to_string(), Value::Array(names));
                (meta.scheme, &meta.nonce, &meta.encrypted_data_key, meta.key_index)
            }
            Self::V1(meta) => {
                map.insert(VERSION_KEY.to_string(), Value::from(METADATA_VERSION_V1));
                map.insert(BLOB_KEY.to_string(), Value::Binary(meta.encrypted_fields.clone()));
                (meta.scheme, &meta.nonce, &meta.encrypted_data_key, meta.key_index)
            }
        };
        map.insert(SCHEME_KEY.to_string(), Value::from(scheme.id()));
        map.insert(NONCE_KEY.to_string(), Value::Binary(nonce.clone()));
        map.insert(DATA_KEY_KEY.to_string(), Value::Binary(data_key.clone()));
        if let Some(index) = key_index {
            map.insert(KEY_INDEX_KEY.to_string(), Value::from(u64::from(index)));
        }
        Value::Object(map)
    }

    /// Reads metadata from a record value, detecting its format.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFormat` if the value matches neither format
    /// or a required entry is missing or mistyped.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut map) = value else {
            return Err(unsupported("metadata is not an object"));
        };

        let scheme_id = take_u64(&mut map, SCHEME_KEY)?;
        let scheme = EncryptionScheme::from_id(scheme_id)
            .ok_or_else(|| unsupported(&format!("unknown scheme {scheme_id}")))?;
        let nonce = take_binary(&mut map, NONCE_KEY)?;
        let encrypted_data_key = take_binary(&mut map, DATA_KEY_KEY)?;
        let key_index = match map.remove(KEY_INDEX_KEY) {
            None => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| unsupported("`keyIndex` is not a small integer"))?,
            ),
        };

        match (map.contains_key(BLOB_KEY), map.contains_key(FIELD_NAMES_KEY)) {
            (true, false) => {
                let version = take_u64(&mut map, VERSION_KEY)?;
                if version != METADATA_VERSION_V1 {
                    return Err(unsupported(&format!("unknown metadata version {version}")));
                }
                Ok(Self::V1(MetadataV1 {
                    scheme,
                    nonce,
                    encrypted_data_key,
                    key_index,
                    encrypted_fields: take_binary(&mut map, BLOB_KEY)?,
                }))
            }
            (false, true) => Ok(Self::Legacy(LegacyMetadata {
                scheme,
                nonce,
                encrypted_data_key,
                key_index,
                encrypted_field_names: take_names(&mut map, FIELD_NAMES_KEY)?,
            })),
            (true, true) => Err(unsupported("both `encryptedFields` and `encryptedFieldNames` present")),
            (false, false) => Err(unsupported("neither `encryptedFields` nor `encryptedFieldNames` present")),
        }
    }
}

/// Builds the encrypted record from cipher output and key information.
///
/// # Errors
///
/// Returns `Error::ReservedField` if the visible record already carries
/// [`METADATA_FIELD`].
pub fn assemble(
    sealed: SealedFields,
    scheme: EncryptionScheme,
    encrypted_data_key: Vec<u8>,
    key_index: Option<u32>,
) -> Result<Record, Error> {
    let (mut record, metadata) = match sealed {
        SealedFields::Consolidated { remainder, nonce, ciphertext } => (
            remainder,
            EnvelopeMetadata::V1(MetadataV1 {
                scheme,
                nonce,
                encrypted_data_key,
                key_index,
                encrypted_fields: ciphertext,
            }),
        ),
        SealedFields::PerField { record, nonce, field_names } => (
            record,
            EnvelopeMetadata::Legacy(LegacyMetadata {
                scheme,
                nonce,
                encrypted_data_key,
                key_index,
                encrypted_field_names: field_names,
            }),
        ),
    };

    if record.contains_key(METADATA_FIELD) {
        return Err(Error::ReservedField(METADATA_FIELD.to_string()));
    }
    record.insert(METADATA_FIELD.to_string(), metadata.to_value());
    Ok(record)
}

/// Splits an encrypted record into its metadata and the visible remainder.
///
/// # Errors
///
/// Returns `Error::UnsupportedFormat` if the metadata field is missing or
/// malformed.
pub fn parse(mut record: Record) -> Result<(EnvelopeMetadata, Record), Error> {
    let value = record
        .remove(METADATA_FIELD)
        .ok_or_else(|| unsupported(&format!("missing `{METADATA_FIELD}`")))?;
    Ok((EnvelopeMetadata::from_value(value)?, record))
}

/// Pairs parsed metadata with the visible remainder as cipher input.
#[must_use]
pub fn into_sealed(metadata: EnvelopeMetadata, remainder: Record) -> SealedFields {
    match metadata {
        EnvelopeMetadata::V1(meta) => SealedFields::Consolidated {
            remainder,
            nonce: meta.nonce,
            ciphertext: meta.encrypted_fields,
        },
        EnvelopeMetadata::Legacy(meta) => SealedFields::PerField {
            record: remainder,
            nonce: meta.nonce,
            field_names: meta.encrypted_field_names,
        },
    }
}

fn unsupported(msg: &str) -> Error {
    Error::UnsupportedFormat(msg.to_string())
}

fn take_u64(map: &mut BTreeMap<String, Value>, key: &str) -> Result<u64, Error> {
    map.remove(key)
        .and_then(|value| value.as_u64())
        .ok_or_else(|| unsupported(&format!("`{key}` missing or not an unsigned integer")))
}

fn take_binary(map: &mut BTreeMap<String, Value>, key: &str) -> Result<Vec<u8>, Error> {
    match map.remove(key) {
        Some(Value::Binary(bytes)) => Ok(bytes),
        _ => Err(unsupported(&format!("`{key}` missing or not binary"))),
    }
}

fn take_names(map: &mut BTreeMap<String, Value>, key: &str) -> Result<Vec<String>, Error> {
    let Some(Value::Array(items)) = map.remove(key) else {
        return Err(unsupported(&format!("`{key}` missing or not an array")));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Ok(name),
            _ => Err(unsupported(&format!("`{key}` contains a non-string entry"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1() -> EnvelopeMetadata {
        EnvelopeMetadata::V1(MetadataV1 {
            scheme: EncryptionScheme::XChaCha20Poly1305,
            nonce: vec![1; 24],
            encrypted_data_key: vec![2; 40],
            key_index: Some(3),
            encrypted_fields: vec![4; 64],
        })
    }

    fn legacy() -> EnvelopeMetadata {
        EnvelopeMetadata::Legacy(LegacyMetadata {
            scheme: EncryptionScheme::XChaCha20Poly1305,
            nonce: vec![1; 24],
            encrypted_data_key: vec![2; 40],
            key_index: None,
            encrypted_field_names: vec!["balance".to_string(), "notes".to_string()],
        })
    }

    fn object(value: Value) -> BTreeMap<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_v1_wire_shape() {
        let map = object(v1().to_value());
        assert_eq!(map.get(VERSION_KEY), Some(&Value::from(1u64)));
        assert_eq!(map.get(SCHEME_KEY), Some(&Value::from(0u64)));
        assert_eq!(map.get(KEY_INDEX_KEY), Some(&Value::from(3u64)));
        assert!(map.get(BLOB_KEY).and_then(Value::as_binary).is_some());
        assert!(!map.contains_key(FIELD_NAMES_KEY));
    }

    #[test]
    fn test_legacy_wire_shape_has_no_version() {
        let map = object(legacy().to_value());
        assert!(!map.contains_key(VERSION_KEY));
        assert!(!map.contains_key(BLOB_KEY));
        assert!(!map.contains_key(KEY_INDEX_KEY));
        assert_eq!(
            map.get(FIELD_NAMES_KEY),
            Some(&Value::Array(vec![Value::from("balance"), Value::from("notes")]))
        );
    }

    #[test]
    fn test_format_detected_from_shape() {
        assert_eq!(EnvelopeMetadata::from_value(v1().to_value()).unwrap(), v1());
        assert_eq!(EnvelopeMetadata::from_value(legacy().to_value()).unwrap(), legacy());
    }

    #[test]
    fn test_metadata_survives_json() {
        let json = serde_json::to_string(&v1().to_value()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(EnvelopeMetadata::from_value(value).unwrap(), v1());
    }

    #[test]
    fn test_ambiguous_shapes_rejected() {
        let mut both = object(v1().to_value());
        both.insert(FIELD_NAMES_KEY.to_string(), Value::Array(vec![]));
        assert!(matches!(
            EnvelopeMetadata::from_value(Value::Object(both)),
            Err(Error::UnsupportedFormat(_))
        ));

        let mut neither = object(v1().to_value());
        neither.remove(BLOB_KEY);
        assert!(matches!(
            EnvelopeMetadata::from_value(Value::Object(neither)),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_or_unknown_version_and_scheme_rejected() {
        let mut future = object(v1().to_value());
        future.insert(VERSION_KEY.to_string(), Value::from(2u64));
        assert!(matches!(
            EnvelopeMetadata::from_value(Value::Object(future)),
            Err(Error::UnsupportedFormat(_))
        ));

        let mut unversioned = object(v1().to_value());
        unversioned.remove(VERSION_KEY);
        assert!(matches!(
            EnvelopeMetadata::from_value(Value::Object(unversioned)),
            Err(Error::UnsupportedFormat(msg)) if msg.contains(VERSION_KEY)
        ));

        let mut scheme = object(v1().to_value());
        scheme.insert(SCHEME_KEY.to_string(), Value::from(9u64));
        assert!(matches!(
            EnvelopeMetadata::from_value(Value::Object(scheme)),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_assemble_and_parse() {
        let sealed = SealedFields::Consolidated {
            remainder: Record::from([("pk".to_string(), Value::from("account-123"))]),
            nonce: vec![1; 24],
            ciphertext: vec![4; 64],
        };
        let record =
            assemble(sealed.clone(), EncryptionScheme::XChaCha20Poly1305, vec![2; 40], Some(3))
                .unwrap();
        assert!(record.contains_key(METADATA_FIELD));

        let (metadata, remainder) = parse(record).unwrap();
        assert_eq!(metadata, v1());
        assert_eq!(into_sealed(metadata, remainder), sealed);
    }

    #[test]
    fn test_assemble_rejects_reserved_field() {
        let sealed = SealedFields::Consolidated {
            remainder: Record::from([(METADATA_FIELD.to_string(), Value::Null)]),
            nonce: vec![1; 24],
            ciphertext: vec![],
        };
        let result = assemble(sealed, EncryptionScheme::XChaCha20Poly1305, vec![], None);
        assert!(matches!(result, Err(Error::ReservedField(_))));
    }

    #[test]
    fn test_parse_requires_metadata() {
        let result = parse(Record::from([("pk".to_string(), Value::from("x"))]));
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }
}
