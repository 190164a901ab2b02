//! Serialization of Rust values into BSER.
//!
//! [`Serializer`] drives any `serde::Serialize` type; [`to_vec`] and
//! [`to_writer`] are the usual entry points. The dynamic path,
//! [`Serializer::serialize_value`], encodes a [`Value`] tree and is the only
//! place template detection happens: serde's trait surface cannot see that a
//! sequence of structs is homogeneous without buffering it, so typed
//! sequences always encode as plain arrays.

use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use serde::ser::{self, Serialize};

use crate::{
    error::{Error, Result},
    raw::TOKEN,
    tag::Tag,
    value::Value,
};

/// Serializes Rust values into a BSER byte stream.
pub struct Serializer<W> {
    writer: W,
}

impl<W> Serializer<W>
where
    W: io::Write,
{
    /// Create a serializer writing to `writer`.
    pub fn new(writer: W) -> Self {
        Serializer { writer }
    }

    /// Consume the serializer and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    #[inline]
    fn write_tag(&mut self, tag: Tag) -> Result<()> {
        self.writer.write_u8(tag as u8)?;
        Ok(())
    }

    /// Write `v` under the narrowest integer tag whose signed range strictly
    /// contains it.
    ///
    /// Strictness means the extreme values of each width are promoted to the
    /// next width: `127` travels as Int16, `-32768` as Int32, and so on. The
    /// decoder accepts every width everywhere, so the promotion only costs a
    /// few bytes.
    pub(crate) fn write_int(&mut self, v: i64) -> Result<()> {
        if v > i64::from(i8::MIN) && v < i64::from(i8::MAX) {
            self.write_tag(Tag::Int8)?;
            self.writer.write_i8(v as i8)?;
        } else if v > i64::from(i16::MIN) && v < i64::from(i16::MAX) {
            self.write_tag(Tag::Int16)?;
            self.writer.write_i16::<LittleEndian>(v as i16)?;
        } else if v > i64::from(i32::MIN) && v < i64::from(i32::MAX) {
            self.write_tag(Tag::Int32)?;
            self.writer.write_i32::<LittleEndian>(v as i32)?;
        } else {
            self.write_tag(Tag::Int64)?;
            self.writer.write_i64::<LittleEndian>(v)?;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i64::try_from(len).map_err(|_| Error::IntegerOverflow(len as u64))?;
        self.write_int(len)
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_tag(Tag::String)?;
        self.write_len(bytes.len())?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    #[inline]
    fn write_real(&mut self, v: f64) -> Result<()> {
        self.write_tag(Tag::Real)?;
        self.writer.write_f64::<LittleEndian>(v)?;
        Ok(())
    }

    #[inline]
    fn begin_array(&mut self, len: usize) -> Result<()> {
        self.write_tag(Tag::Array)?;
        self.write_len(len)
    }

    #[inline]
    fn begin_object(&mut self, len: usize) -> Result<()> {
        self.write_tag(Tag::Object)?;
        self.write_len(len)
    }

    /// Encode a dynamic [`Value`] tree.
    ///
    /// A non-empty array whose elements are all objects sharing one key
    /// sequence is compressed into a template: the key array once, then the
    /// rows in row-major order. Every row carries every field: the `0x0c`
    /// omitted-field marker is accepted on decode for interoperability but
    /// never produced here. Any other array shape encodes as a plain array.
    pub fn serialize_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_tag(Tag::Null),
            Value::Bool(true) => self.write_tag(Tag::True),
            Value::Bool(false) => self.write_tag(Tag::False),
            Value::Int(v) => self.write_int(*v),
            Value::Real(v) => self.write_real(*v),
            Value::String(s) => self.write_bytes(s.as_bytes()),
            Value::Array(items) => match TemplateView::detect(items) {
                Some(view) => self.write_template(&view),
                None => {
                    self.begin_array(items.len())?;
                    for item in items {
                        self.serialize_value(item)?;
                    }
                    Ok(())
                }
            },
            Value::Object(entries) => {
                self.begin_object(entries.len())?;
                for (key, item) in entries {
                    self.write_bytes(key.as_bytes())?;
                    self.serialize_value(item)?;
                }
                Ok(())
            }
        }
    }

    fn write_template(&mut self, view: &TemplateView<'_>) -> Result<()> {
        self.write_tag(Tag::Template)?;

        self.begin_array(view.keys.len())?;
        for key in &view.keys {
            self.write_bytes(key.as_bytes())?;
        }

        self.write_len(view.rows.len())?;
        for row in &view.rows {
            for (_, item) in *row {
                self.serialize_value(item)?;
            }
        }
        Ok(())
    }
}

/// A homogeneous object array viewed as template keys plus rows.
struct TemplateView<'a> {
    keys: Vec<&'a str>,
    rows: Vec<&'a [(String, Value)]>,
}

impl<'a> TemplateView<'a> {
    /// Template eligibility: at least one element, every element an object,
    /// and every object carrying the same keys in the same order.
    fn detect(items: &'a [Value]) -> Option<TemplateView<'a>> {
        let first = match items.first()? {
            Value::Object(entries) => entries,
            _ => return None,
        };
        let keys: Vec<&str> = first.iter().map(|(key, _)| key.as_str()).collect();

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let entries = match item {
                Value::Object(entries) => entries,
                _ => return None,
            };
            if entries.len() != keys.len() {
                return None;
            }
            if entries.iter().zip(&keys).any(|((key, _), want)| key != want) {
                return None;
            }
            rows.push(entries.as_slice());
        }

        Some(TemplateView { keys, rows })
    }
}

impl<'a, W> ser::Serializer for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    #[inline]
    fn serialize_bool(self, v: bool) -> Result<()> {
        self.write_tag(if v { Tag::True } else { Tag::False })
    }

    #[inline]
    fn serialize_i8(self, v: i8) -> Result<()> {
        self.write_int(i64::from(v))
    }

    #[inline]
    fn serialize_i16(self, v: i16) -> Result<()> {
        self.write_int(i64::from(v))
    }

    #[inline]
    fn serialize_i32(self, v: i32) -> Result<()> {
        self.write_int(i64::from(v))
    }

    #[inline]
    fn serialize_i64(self, v: i64) -> Result<()> {
        self.write_int(v)
    }

    #[inline]
    fn serialize_u8(self, v: u8) -> Result<()> {
        self.write_int(i64::from(v))
    }

    #[inline]
    fn serialize_u16(self, v: u16) -> Result<()> {
        self.write_int(i64::from(v))
    }

    #[inline]
    fn serialize_u32(self, v: u32) -> Result<()> {
        self.write_int(i64::from(v))
    }

    #[inline]
    fn serialize_u64(self, v: u64) -> Result<()> {
        let v = i64::try_from(v).map_err(|_| Error::IntegerOverflow(v))?;
        self.write_int(v)
    }

    #[inline]
    fn serialize_f32(self, v: f32) -> Result<()> {
        self.write_real(f64::from(v))
    }

    #[inline]
    fn serialize_f64(self, v: f64) -> Result<()> {
        self.write_real(v)
    }

    #[inline]
    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    #[inline]
    fn serialize_str(self, v: &str) -> Result<()> {
        self.write_bytes(v.as_bytes())
    }

    #[inline]
    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        // BSER strings are byte strings; raw bytes and UTF-8 text share the
        // same wire shape.
        self.write_bytes(v)
    }

    #[inline]
    fn serialize_unit(self) -> Result<()> {
        self.write_tag(Tag::Null)
    }

    #[inline]
    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    #[inline]
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized>(self, name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        if name == TOKEN {
            // RawValue splice: the payload is a complete tagged value and is
            // written through untouched.
            return value.serialize(RawSplice { ser: self });
        }
        value.serialize(self)
    }

    #[inline]
    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()>
    where
        T: Serialize,
    {
        self.begin_object(1)?;
        self.serialize_str(variant)?;
        value.serialize(self)
    }

    #[inline]
    fn serialize_none(self) -> Result<()> {
        self.write_tag(Tag::Null)
    }

    #[inline]
    fn serialize_some<T: ?Sized>(self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(self)
    }

    #[inline]
    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        let len = len.ok_or(Error::LengthRequired)?;
        self.begin_array(len)?;
        Ok(self)
    }

    #[inline]
    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    #[inline]
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    #[inline]
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.begin_object(1)?;
        self.serialize_str(variant)?;
        self.serialize_seq(Some(len))
    }

    #[inline]
    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        let len = len.ok_or(Error::LengthRequired)?;
        self.begin_object(len)?;
        Ok(self)
    }

    #[inline]
    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        self.serialize_map(Some(len))
    }

    #[inline]
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        self.begin_object(1)?;
        self.serialize_str(variant)?;
        self.serialize_map(Some(len))
    }
}

impl<'a, W> ser::SerializeSeq for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, W> ser::SerializeTuple for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, W> ser::SerializeTupleStruct for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, W> ser::SerializeTupleVariant for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, W> ser::SerializeMap for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_key<T: ?Sized>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize,
    {
        key.serialize(MapKeySerializer { ser: &mut **self })
    }

    #[inline]
    fn serialize_value<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, W> ser::SerializeStruct for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T: ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_bytes(key.as_bytes())?;
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, W> ser::SerializeStructVariant for &'a mut Serializer<W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T: ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_bytes(key.as_bytes())?;
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

/// Key-position sub-serializer: emits strings, stringifies integers, rejects
/// everything else. Object keys are always String-tagged on the wire.
struct MapKeySerializer<'a, W> {
    ser: &'a mut Serializer<W>,
}

impl<'a, W> MapKeySerializer<'a, W>
where
    W: io::Write,
{
    fn write_int_key(self, value: impl itoa::Integer) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.ser.write_bytes(buf.format(value).as_bytes())
    }
}

impl<'a, W> ser::Serializer for MapKeySerializer<'a, W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    type SerializeSeq = ser::Impossible<(), Error>;
    type SerializeTuple = ser::Impossible<(), Error>;
    type SerializeTupleStruct = ser::Impossible<(), Error>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    #[inline]
    fn serialize_str(self, value: &str) -> Result<()> {
        self.ser.write_bytes(value.as_bytes())
    }

    #[inline]
    fn serialize_char(self, value: char) -> Result<()> {
        let mut buf = [0; 4];
        self.serialize_str(value.encode_utf8(&mut buf))
    }

    #[inline]
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    #[inline]
    fn serialize_newtype_struct<T: ?Sized>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(self)
    }

    fn serialize_i8(self, value: i8) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_i16(self, value: i16) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_i32(self, value: i32) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_i64(self, value: i64) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_u8(self, value: u8) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_u16(self, value: u16) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_u32(self, value: u32) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_u64(self, value: u64) -> Result<()> {
        self.write_int_key(value)
    }

    fn serialize_bool(self, _value: bool) -> Result<()> {
        Err(Error::NonStringKey)
    }

    fn serialize_f32(self, _value: f32) -> Result<()> {
        Err(Error::NonStringKey)
    }

    fn serialize_f64(self, _value: f64) -> Result<()> {
        Err(Error::NonStringKey)
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<()> {
        self.ser.write_bytes(value)
    }

    fn serialize_unit(self) -> Result<()> {
        Err(Error::NonStringKey)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Err(Error::NonStringKey)
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()>
    where
        T: Serialize,
    {
        Err(Error::NonStringKey)
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::NonStringKey)
    }

    fn serialize_some<T: ?Sized>(self, _value: &T) -> Result<()>
    where
        T: Serialize,
    {
        Err(Error::NonStringKey)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::NonStringKey)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(Error::NonStringKey)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(Error::NonStringKey)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::NonStringKey)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::NonStringKey)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(Error::NonStringKey)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::NonStringKey)
    }
}

/// Splice serializer behind [`RawValue`](crate::RawValue): accepts exactly
/// one `serialize_bytes` call and writes the bytes with no tag of its own.
struct RawSplice<'a, W> {
    ser: &'a mut Serializer<W>,
}

impl<'a, W> RawSplice<'a, W> {
    fn reject<T>() -> Result<T> {
        Err(Error::Message("raw value payload must be bytes".to_owned()))
    }
}

impl<'a, W> ser::Serializer for RawSplice<'a, W>
where
    W: io::Write,
{
    type Ok = ();
    type Error = Error;

    type SerializeSeq = ser::Impossible<(), Error>;
    type SerializeTuple = ser::Impossible<(), Error>;
    type SerializeTupleStruct = ser::Impossible<(), Error>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.ser.writer.write_all(v)?;
        Ok(())
    }

    fn serialize_bool(self, _: bool) -> Result<()> {
        Self::reject()
    }

    fn serialize_i8(self, _: i8) -> Result<()> {
        Self::reject()
    }

    fn serialize_i16(self, _: i16) -> Result<()> {
        Self::reject()
    }

    fn serialize_i32(self, _: i32) -> Result<()> {
        Self::reject()
    }

    fn serialize_i64(self, _: i64) -> Result<()> {
        Self::reject()
    }

    fn serialize_u8(self, _: u8) -> Result<()> {
        Self::reject()
    }

    fn serialize_u16(self, _: u16) -> Result<()> {
        Self::reject()
    }

    fn serialize_u32(self, _: u32) -> Result<()> {
        Self::reject()
    }

    fn serialize_u64(self, _: u64) -> Result<()> {
        Self::reject()
    }

    fn serialize_f32(self, _: f32) -> Result<()> {
        Self::reject()
    }

    fn serialize_f64(self, _: f64) -> Result<()> {
        Self::reject()
    }

    fn serialize_char(self, _: char) -> Result<()> {
        Self::reject()
    }

    fn serialize_str(self, _: &str) -> Result<()> {
        Self::reject()
    }

    fn serialize_unit(self) -> Result<()> {
        Self::reject()
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<()> {
        Self::reject()
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<()> {
        Self::reject()
    }

    fn serialize_newtype_struct<T: ?Sized>(self, _: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<()>
    where
        T: Serialize,
    {
        Self::reject()
    }

    fn serialize_none(self) -> Result<()> {
        Self::reject()
    }

    fn serialize_some<T: ?Sized>(self, _: &T) -> Result<()>
    where
        T: Serialize,
    {
        Self::reject()
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq> {
        Self::reject()
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Self::reject()
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeTupleStruct> {
        Self::reject()
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Self::reject()
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Self::reject()
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Self::reject()
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Self::reject()
    }
}

// ----------------------------------------------------------------------------

/// Serialize `value` as BSER into an `io::Write`.
///
/// # Errors
///
/// Fails if `value`'s `Serialize` impl fails, if a map key is not stringable,
/// or on writer errors.
pub fn to_writer<W, T: ?Sized>(writer: W, value: &T) -> Result<()>
where
    W: io::Write,
    T: Serialize,
{
    let mut ser = Serializer::new(writer);
    value.serialize(&mut ser)
}

/// Serialize `value` as a BSER byte vector.
///
/// # Errors
///
/// Same failure conditions as [`to_writer`].
pub fn to_vec<T: ?Sized>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    let mut out = Vec::with_capacity(128);
    to_writer(&mut out, value)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_bytes(v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        Serializer::new(&mut out).write_int(v).unwrap();
        out
    }

    #[test]
    fn fitting_rule_boundaries() {
        // Strict containment: each width's extremes promote to the next tag.
        assert_eq!(int_bytes(126)[0], Tag::Int8 as u8);
        assert_eq!(int_bytes(127)[0], Tag::Int16 as u8);
        assert_eq!(int_bytes(-127)[0], Tag::Int8 as u8);
        assert_eq!(int_bytes(-128)[0], Tag::Int16 as u8);

        assert_eq!(int_bytes(32_766)[0], Tag::Int16 as u8);
        assert_eq!(int_bytes(32_767)[0], Tag::Int32 as u8);
        assert_eq!(int_bytes(-32_767)[0], Tag::Int16 as u8);
        assert_eq!(int_bytes(-32_768)[0], Tag::Int32 as u8);

        assert_eq!(int_bytes(2_147_483_646)[0], Tag::Int32 as u8);
        assert_eq!(int_bytes(2_147_483_647)[0], Tag::Int64 as u8);
        assert_eq!(int_bytes(-2_147_483_647)[0], Tag::Int32 as u8);
        assert_eq!(int_bytes(-2_147_483_648)[0], Tag::Int64 as u8);

        assert_eq!(int_bytes(i64::MAX)[0], Tag::Int64 as u8);
        assert_eq!(int_bytes(i64::MIN)[0], Tag::Int64 as u8);
    }

    #[test]
    fn unsigned_overflow_is_rejected() {
        let err = to_vec(&u64::MAX).unwrap_err();
        assert!(matches!(err, Error::IntegerOverflow(u64::MAX)));
    }

    #[test]
    fn map_keys_must_be_stringable() {
        use std::collections::HashMap;

        // Integer keys are stringified.
        let mut numeric = HashMap::new();
        numeric.insert(42u64, "x");
        let bytes = to_vec(&numeric).unwrap();
        assert_eq!(&bytes[..8], &[0x01, 0x03, 0x01, 0x02, 0x03, 0x02, b'4', b'2']);

        // Sequence keys are not.
        let mut bad = HashMap::new();
        bad.insert(vec![1u8, 2], "x");
        assert!(matches!(to_vec(&bad), Err(Error::NonStringKey)));
    }

    #[test]
    fn unknown_length_sequences_are_rejected() {
        struct Unsized;

        impl Serialize for Unsized {
            fn serialize<S: ser::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                use serde::ser::SerializeSeq;
                let seq = serializer.serialize_seq(None)?;
                seq.end()
            }
        }

        assert!(matches!(to_vec(&Unsized), Err(Error::LengthRequired)));
    }
}
