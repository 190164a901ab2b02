//! Raw, uninterpreted BSER values.

use serde::de::{self, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::error::Result;
use crate::value::Value;

/// Marker name routing `RawValue` through the codec's capture/splice paths.
///
/// The serializer and deserializer recognize this newtype name and switch to
/// raw-bytes handling, the same trick serde_json plays for its `RawValue`.
pub(crate) const TOKEN: &str = "$vigil_bser::raw";

/// One complete tagged value, held as its exact wire bytes.
///
/// This is the escape hatch for custom codecs on both sides:
///
/// - **Decode**: a `RawValue` destination makes the deserializer capture the
///   next value verbatim (leading tag included) instead of interpreting it. A
///   type wanting full control implements `Deserialize` by reading a
///   `RawValue` and parsing the bytes itself.
/// - **Encode**: serializing a `RawValue` splices its bytes into the output
///   with no additional tag; the bytes are trusted to form one complete
///   value. A type wanting full control produces a `RawValue`.
///
/// The client's demultiplexer also uses `RawValue` to hold response PDUs
/// whose destination type is not yet known.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawValue(Vec<u8>);

impl RawValue {
    /// Wrap bytes that already form one complete tagged value.
    ///
    /// No validation happens here; feeding malformed bytes will surface as an
    /// error wherever the value is eventually spliced and decoded.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        RawValue(bytes)
    }

    /// The captured wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the captured bytes into a concrete type.
    pub fn decode<'a, T>(&'a self) -> Result<T>
    where
        T: de::Deserialize<'a>,
    {
        crate::from_slice(self.as_bytes())
    }

    /// Decode the captured bytes into a dynamic [`Value`].
    pub fn to_value(&self) -> Result<Value> {
        self.decode()
    }
}

impl Serialize for RawValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_newtype_struct(TOKEN, &Splice(&self.0))
    }
}

/// Inner carrier forcing the payload through `serialize_bytes`.
struct Splice<'a>(&'a [u8]);

impl<'a> Serialize for Splice<'a> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

impl<'de> de::Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<RawValue, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_newtype_struct(TOKEN, RawValueVisitor)
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a raw BSER value")
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<RawValue, E> {
        Ok(RawValue(v))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<RawValue, E> {
        Ok(RawValue(v.to_vec()))
    }
}
