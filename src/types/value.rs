//! Opaque stored payloads and their JSON encoding.
//!
//! A [`Value`] is an immutable byte sequence. On the wire it is encoded as a
//! plain JSON string when the bytes are valid UTF-8, and as a `{"hex":"..."}`
//! object otherwise, so arbitrary binary payloads survive the JSON transport
//! byte-for-byte.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An opaque byte payload stored under a key.
///
/// Equality is byte-wise. Values are constructed from caller input or decoded
/// from the wire and are immutable thereafter.
///
/// # Examples
///
/// ```
/// use canopy_client::Value;
///
/// let v = Value::from("hello");
/// assert_eq!(v.as_bytes(), b"hello");
///
/// let raw = Value::from(vec![0xff, 0x00]);
/// assert_eq!(serde_json::to_string(&raw).unwrap(), r#"{"hex":"ff00"}"#);
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Value(Vec<u8>);

impl Value {
    /// Create a value from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Value(bytes.into())
    }

    /// The raw bytes of the value.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the value, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length of the value in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the value holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value as a `&str`, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Value({:?})", s),
            None => write!(f, "Value(hex:{})", hex::encode(&self.0)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(s.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Value {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(s) => serializer.serialize_str(s),
            Err(_) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("hex", &hex::encode(&self.0))?;
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or a {\"hex\": ...} object")
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value(s.as_bytes().to_vec()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut bytes: Option<Vec<u8>> = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "hex" {
                let encoded: String = map.next_value()?;
                bytes = Some(hex::decode(&encoded).map_err(de::Error::custom)?);
            } else {
                return Err(de::Error::unknown_field(&key, &["hex"]));
            }
        }
        bytes
            .map(Value)
            .ok_or_else(|| de::Error::missing_field("hex"))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_round_trips_as_string() {
        let v = Value::from("hello world");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#""hello world""#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn binary_round_trips_as_hex_object() {
        let v = Value::from(vec![0xde, 0xad, 0x00, 0xff]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"hex":"dead00ff"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_bytes(), &[0xde, 0xad, 0x00, 0xff]);
    }

    #[test]
    fn decodes_hex_object_with_utf8_content() {
        let back: Value = serde_json::from_str(r#"{"hex":"666f6f"}"#).unwrap();
        assert_eq!(back.as_bytes(), b"foo");
    }

    #[test]
    fn null_decodes_to_empty() {
        let v: Value = serde_json::from_str("null").unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(serde_json::from_str::<Value>(r#"{"hex":"zz"}"#).is_err());
    }

    #[test]
    fn rejects_unknown_object_key() {
        assert!(serde_json::from_str::<Value>(r#"{"b64":"zz"}"#).is_err());
    }
}
