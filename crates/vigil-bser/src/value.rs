//! Dynamic BSER values.
//!
//! [`Value`] is the schema-free side of the codec: any PDU decodes into it,
//! and callers that build requests at runtime encode out of it. Object
//! entries keep their insertion order; the wire format is ordered and the
//! template encoder depends on rows sharing one key sequence.

use serde::de::{self, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer as _};

use crate::error::Result;

/// One BSER value of any shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer; the wire width is chosen at encode time.
    Int(i64),
    /// An IEEE-754 binary64.
    Real(f64),
    /// A UTF-8 string.
    String(String),
    /// A sequence of values.
    Array(Vec<Value>),
    /// String-keyed entries in insertion order.
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Encode this value as a standalone tagged byte sequence.
    ///
    /// This is the dynamic encoding path: homogeneous object arrays are
    /// compressed into template form. See
    /// [`Serializer::serialize_value`](crate::Serializer::serialize_value).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(128);
        crate::Serializer::new(&mut out).serialize_value(self)?;
        Ok(out)
    }

    /// Decode a standalone tagged byte sequence.
    pub fn from_slice(bytes: &[u8]) -> Result<Value> {
        crate::from_slice(bytes)
    }

    /// Look up an entry of an object value.
    ///
    /// Returns `None` for non-objects and missing keys alike.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => {
                entries.iter().find(|(name, _)| name == key).map(|(_, value)| value)
            }
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The float payload, if this is a real.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// The boolean payload, if this is a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// True for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Real(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::Array(v)
    }
}

/// Plain structural serialization, used when a `Value` sits inside a typed
/// request. No template detection happens on this path.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Real(v) => serializer.serialize_f64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> de::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("any BSER value")
    }

    fn visit_bool<E>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i8<E>(self, v: i8) -> std::result::Result<Value, E> {
        Ok(Value::Int(i64::from(v)))
    }

    fn visit_i16<E>(self, v: i16) -> std::result::Result<Value, E> {
        Ok(Value::Int(i64::from(v)))
    }

    fn visit_i32<E>(self, v: i32) -> std::result::Result<Value, E> {
        Ok(Value::Int(i64::from(v)))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &"a signed 64-bit integer"))
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Real(v))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        match std::str::from_utf8(v) {
            Ok(s) => Ok(Value::String(s.to_owned())),
            Err(_) => Err(E::invalid_value(de::Unexpected::Bytes(v), &"a utf-8 string")),
        }
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        self.visit_bytes(&v)
    }

    fn visit_unit<E>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        de::Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Value, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry()? {
            entries.push(entry);
        }
        Ok(Value::Object(entries))
    }
}

/// Build a [`Value::Object`] from key/value pairs in order.
#[macro_export]
macro_rules! object {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::Value::Object(vec![
            $(($key.to_string(), $crate::Value::from($value))),*
        ])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_walks_object_entries() {
        let value = object! { "version" => "4.9.0", "clock" => "c:1:2" };
        assert_eq!(value.get("clock").and_then(Value::as_str), Some("c:1:2"));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Null.get("clock"), None);
    }

    #[test]
    fn object_preserves_insertion_order() {
        let value = object! { "z" => 1i64, "a" => 2i64 };
        let Value::Object(entries) = value else { panic!("expected object") };
        assert_eq!(entries[0].0, "z");
        assert_eq!(entries[1].0, "a");
    }
}
