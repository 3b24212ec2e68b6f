//! Canonical serialization of field values.
//!
//! Values are written as compact JSON with object keys in lexicographic order,
//! so structurally equal values always produce identical bytes regardless of
//! how they were built. Binary values use the marker object described in
//! [`crate::record`] and are restored as [`Value::Binary`] on the way back.

use crate::error::Error;
use crate::record::Value;

/// Serializes a value to its canonical byte form.
///
/// # Errors
///
/// Returns `Error::Serialization` if the value cannot be written as JSON.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(value)?)
}

/// Parses canonical bytes back into a value.
///
/// # Errors
///
/// Returns `Error::Serialization` if the bytes are not valid JSON.
pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Value, Error> {
    Ok(serde_json::from_slice(bytes)?)
}
