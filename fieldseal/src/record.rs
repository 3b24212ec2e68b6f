//! Structured record values.
//!
//! A [`Record`] is a sorted map of field names to [`Value`]s. Unlike JSON,
//! [`Value`] has a first-class [`Value::Binary`] variant so byte payloads keep
//! their type through encryption. On the wire a binary value is written as the
//! marker object `{"data":[...],"type":"Buffer"}` and restored on read.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// A record: field name to value, ordered by field name.
///
/// A field that is missing from the map is absent; a field mapped to
/// [`Value::Null`] is present.
pub type Record = BTreeMap<String, Value>;

/// Key holding the bytes of a binary marker object.
pub const BINARY_DATA_KEY: &str = "data";

/// Key holding the type tag of a binary marker object.
pub const BINARY_TYPE_KEY: &str = "type";

/// Type tag identifying a binary marker object.
pub const BINARY_TYPE_TAG: &str = "Buffer";

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer or floating point number.
    Number(serde_json::Number),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Ordered list.
    Array(Vec<Value>),
    /// Nested structure, ordered by key.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the bytes of a binary value.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the string slice of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer, if it is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Converts a JSON value, restoring binary marker objects at any depth.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => match binary_marker_bytes(&map) {
                Some(bytes) => Self::Binary(bytes),
                None => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect()),
            },
        }
    }

    /// Converts into a JSON value, writing binary values as marker objects.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Number(n) => serde_json::Value::Number(n),
            Self::String(s) => serde_json::Value::String(s),
            Self::Binary(bytes) => {
                let mut marker = serde_json::Map::new();
                marker.insert(
                    BINARY_DATA_KEY.to_string(),
                    serde_json::Value::Array(bytes.into_iter().map(serde_json::Value::from).collect()),
                );
                marker.insert(
                    BINARY_TYPE_KEY.to_string(),
                    serde_json::Value::String(BINARY_TYPE_TAG.to_string()),
                );
                serde_json::Value::Object(marker)
            }
            Self::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Self::into_json).collect())
            }
            Self::Object(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into_json())).collect())
            }
        }
    }
}

/// Recognizes `{"data":[0..=255, ...],"type":"Buffer"}` and nothing else.
fn binary_marker_bytes(map: &serde_json::Map<String, serde_json::Value>) -> Option<Vec<u8>> {
    if map.len() != 2 || map.get(BINARY_TYPE_KEY)?.as_str()? != BINARY_TYPE_TAG {
        return None;
    }
    map.get(BINARY_DATA_KEY)?
        .as_array()?
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Binary(bytes) => {
                // Keys in sorted order so the marker itself is canonical.
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(BINARY_DATA_KEY, bytes)?;
                map.serialize_entry(BINARY_TYPE_KEY, BINARY_TYPE_TAG)?;
                map.end()
            }
            Self::Array(items) => items.serialize(serializer),
            Self::Object(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Object(map)
    }
}
