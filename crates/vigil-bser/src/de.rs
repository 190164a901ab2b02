//! Deserialization of BSER into Rust values.
//!
//! [`Deserializer`] reads from either a borrowed byte slice ([`SliceRead`],
//! which hands string data out zero-copy) or any `std::io::Read`
//! ([`IoRead`], which stages string data in a scratch buffer). PDUs are
//! size-framed and delivered whole, so the slice path is the common one.
//!
//! Struct destinations get their incoming object keys canonicalized against
//! the declared field list (exact match first, then ASCII-case-insensitive),
//! and a key that matches nothing is an error rather than silently skipped
//! data. Template arrays (tag `0x0b`) are accepted anywhere a sequence is,
//! with the `0x0c` placeholder leaving the named field at its default.
//!
//! The raw-capture path used by [`RawValue`](crate::RawValue) re-reads
//! nothing: the skip parser walks the value while the reader records every
//! consumed byte (slice input records offsets, stream input tees into a side
//! buffer).

use std::{borrow::Cow, io, ops, str};

use byteorder::{ByteOrder, LittleEndian};
use serde::de::{self, Expected, Visitor};
use serde::forward_to_deserialize_any;

use crate::{
    error::{Error, Result},
    fields::FieldSet,
    raw::TOKEN,
    tag::Tag,
};

/// A structure that deserializes BSER into Rust values.
pub struct Deserializer<R> {
    read: R,
    /// One tag of lookahead; `peek_tag` fills it, `read_tag` drains it.
    tag: Option<Tag>,
    scratch: Vec<u8>,
}

impl<R> Deserializer<IoRead<R>>
where
    R: io::Read,
{
    /// Construct a deserializer reading from an `io::Read`.
    pub fn from_reader(read: R) -> Self {
        Deserializer::new(IoRead::new(read))
    }
}

impl<'de> Deserializer<SliceRead<'de>> {
    /// Construct a deserializer reading from a byte slice.
    pub fn from_slice(bytes: &'de [u8]) -> Self {
        Deserializer::new(SliceRead::new(bytes))
    }
}

impl<'de, R> Deserializer<R>
where
    R: Read<'de>,
{
    /// Create a deserializer over any [`Read`] implementation.
    pub fn new(read: R) -> Self {
        Deserializer { read, tag: None, scratch: Vec::new() }
    }

    /// Check that the input is exhausted.
    ///
    /// Call after the top-level value has been deserialized; trailing bytes
    /// are an error because every PDU holds exactly one value.
    pub fn end(&mut self) -> Result<()> {
        if self.tag.is_none() && self.read.at_end()? {
            Ok(())
        } else {
            Err(Error::TrailingBytes)
        }
    }

    fn peek_tag(&mut self) -> Result<Tag> {
        if let Some(tag) = self.tag {
            return Ok(tag);
        }

        let byte = self.read.next_u8()?;
        let tag = Tag::from_byte(byte).ok_or(Error::InvalidTag { tag: byte })?;
        self.tag = Some(tag);
        Ok(tag)
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let tag = self.peek_tag()?;
        self.tag = None;
        Ok(tag)
    }

    /// Require a specific structural tag, e.g. the String tag in front of an
    /// object key.
    fn expect_tag(&mut self, want: Tag, context: &'static str) -> Result<()> {
        let tag = self.read_tag()?;
        if tag == want {
            Ok(())
        } else {
            Err(Error::UnexpectedTag { tag: tag as u8, context })
        }
    }

    #[cold]
    fn mismatch<T>(&self, tag: Tag, exp: &dyn Expected) -> Result<T> {
        Err(de::Error::invalid_type(de::Unexpected::Other(describe(tag)), exp))
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read.next_u8()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.read.read_ref(2, &mut self.scratch)?;
        Ok(LittleEndian::read_i16(&bytes))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read.read_ref(4, &mut self.scratch)?;
        Ok(LittleEndian::read_i32(&bytes))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.read.read_ref(8, &mut self.scratch)?;
        Ok(LittleEndian::read_i64(&bytes))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read.read_ref(8, &mut self.scratch)?;
        Ok(LittleEndian::read_f64(&bytes))
    }

    /// Read a tagged integer; used for every length and count field.
    fn read_int(&mut self) -> Result<i64> {
        match self.read_tag()? {
            Tag::Int8 => Ok(i64::from(self.read_i8()?)),
            Tag::Int16 => Ok(i64::from(self.read_i16()?)),
            Tag::Int32 => Ok(i64::from(self.read_i32()?)),
            Tag::Int64 => self.read_i64(),
            tag => Err(Error::UnexpectedTag { tag: tag as u8, context: "an integer length" }),
        }
    }

    fn read_usize(&mut self) -> Result<usize> {
        let v = self.read_int()?;
        usize::try_from(v).map_err(|_| Error::NegativeLength(v))
    }

    /// Read a length-prefixed byte run; the String tag is already consumed.
    fn read_bytes_ref(&mut self) -> Result<Reference<'de, '_, [u8]>> {
        let len = self.read_usize()?;
        self.read.read_ref(len, &mut self.scratch)
    }

    fn read_str_ref(&mut self) -> Result<Reference<'de, '_, str>> {
        match self.read_bytes_ref()? {
            Reference::Borrowed(b) => Ok(Reference::Borrowed(str::from_utf8(b)?)),
            Reference::Copied(c) => Ok(Reference::Copied(str::from_utf8(c)?)),
        }
    }

    fn scan_bytes<V>(&mut self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_bytes_ref()? {
            Reference::Borrowed(b) => visitor.visit_borrowed_bytes(b),
            Reference::Copied(c) => visitor.visit_bytes(c),
        }
    }

    fn scan_array<V>(&mut self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut remaining = self.read_usize()?;
        let value = visitor.visit_seq(ArrayAccess { de: &mut *self, remaining: &mut remaining })?;

        // A fixed-arity destination may stop early; discard what it left so
        // the stream ends up positioned after the whole array.
        while remaining > 0 {
            remaining -= 1;
            self.skip_value(None)?;
        }
        Ok(value)
    }

    fn scan_object<V>(&mut self, visitor: V, fields: Option<FieldSet>) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut remaining = self.read_usize()?;
        let value = visitor.visit_map(ObjectAccess {
            de: &mut *self,
            remaining: &mut remaining,
            fields,
        })?;

        while remaining > 0 {
            remaining -= 1;
            self.expect_tag(Tag::String, "an object key")?;
            let len = self.read_usize()?;
            self.skip_bytes(len)?;
            self.skip_value(None)?;
        }
        Ok(value)
    }

    fn scan_template<V>(&mut self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.expect_tag(Tag::Array, "a template key array")?;
        let num_keys = self.read_usize()?;

        let mut keys: Vec<Cow<'de, str>> = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            self.expect_tag(Tag::String, "a template key")?;
            let key = match self.read_str_ref()? {
                Reference::Borrowed(s) => Cow::Borrowed(s),
                Reference::Copied(s) => Cow::Owned(s.to_owned()),
            };
            keys.push(key);
        }

        let mut remaining = self.read_usize()?;
        let value = visitor.visit_seq(TemplateRows {
            de: &mut *self,
            keys: &keys,
            remaining: &mut remaining,
        })?;

        while remaining > 0 {
            remaining -= 1;
            self.skip_row(num_keys)?;
        }
        Ok(value)
    }

    /// Capture the raw bytes of the next value, leading tag included.
    fn capture_value(&mut self) -> Result<Vec<u8>> {
        let peeked = self.tag.take();
        self.read.begin_record(peeked.map(|tag| tag as u8));
        let outcome = self.skip_value(peeked);
        let raw = self.read.end_record();
        outcome?;
        Ok(raw)
    }

    /// Walk one complete value without materializing it.
    fn skip_value(&mut self, peeked: Option<Tag>) -> Result<()> {
        let tag = match peeked {
            Some(tag) => tag,
            None => self.read_tag()?,
        };

        match tag {
            Tag::True | Tag::False | Tag::Null => Ok(()),
            Tag::Int8 => self.skip_bytes(1),
            Tag::Int16 => self.skip_bytes(2),
            Tag::Int32 => self.skip_bytes(4),
            Tag::Int64 | Tag::Real => self.skip_bytes(8),
            Tag::String => {
                let len = self.read_usize()?;
                self.skip_bytes(len)
            }
            Tag::Array => {
                let len = self.read_usize()?;
                for _ in 0..len {
                    self.skip_value(None)?;
                }
                Ok(())
            }
            Tag::Object => {
                let len = self.read_usize()?;
                for _ in 0..len {
                    self.expect_tag(Tag::String, "an object key")?;
                    let key_len = self.read_usize()?;
                    self.skip_bytes(key_len)?;
                    self.skip_value(None)?;
                }
                Ok(())
            }
            Tag::Template => {
                self.expect_tag(Tag::Array, "a template key array")?;
                let num_keys = self.read_usize()?;
                for _ in 0..num_keys {
                    self.expect_tag(Tag::String, "a template key")?;
                    let key_len = self.read_usize()?;
                    self.skip_bytes(key_len)?;
                }
                let rows = self.read_usize()?;
                for _ in 0..rows {
                    self.skip_row(num_keys)?;
                }
                Ok(())
            }
            Tag::Missing => Err(Error::UnexpectedTag { tag: 0x0c, context: "a value" }),
        }
    }

    fn skip_row(&mut self, num_keys: usize) -> Result<()> {
        for _ in 0..num_keys {
            if self.peek_tag()? == Tag::Missing {
                self.tag = None;
            } else {
                self.skip_value(None)?;
            }
        }
        Ok(())
    }

    fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.read.read_ref(len, &mut self.scratch)?;
        Ok(())
    }
}

fn describe(tag: Tag) -> &'static str {
    match tag {
        Tag::Array => "array",
        Tag::Object => "object",
        Tag::String => "string",
        Tag::Int8 | Tag::Int16 | Tag::Int32 | Tag::Int64 => "integer",
        Tag::Real => "float",
        Tag::True | Tag::False => "boolean",
        Tag::Null => "null",
        Tag::Template => "template array",
        Tag::Missing => "template placeholder",
    }
}

macro_rules! deserialize_number {
    ($($name:ident)*) => {
        $(
            #[inline]
            fn $name<V>(self, visitor: V) -> Result<V::Value>
            where
                V: Visitor<'de>,
            {
                match self.read_tag()? {
                    Tag::Int8 => visitor.visit_i8(self.read_i8()?),
                    Tag::Int16 => visitor.visit_i16(self.read_i16()?),
                    Tag::Int32 => visitor.visit_i32(self.read_i32()?),
                    Tag::Int64 => visitor.visit_i64(self.read_i64()?),
                    Tag::Real => visitor.visit_f64(self.read_f64()?),
                    tag => self.mismatch(tag, &"a number"),
                }
            }
        )*
    };
}

impl<'de, 'a, R> de::Deserializer<'de> for &'a mut Deserializer<R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::Array => self.scan_array(visitor),
            Tag::Object => self.scan_object(visitor, None),
            Tag::String => self.scan_bytes(visitor),
            Tag::Int8 => visitor.visit_i8(self.read_i8()?),
            Tag::Int16 => visitor.visit_i16(self.read_i16()?),
            Tag::Int32 => visitor.visit_i32(self.read_i32()?),
            Tag::Int64 => visitor.visit_i64(self.read_i64()?),
            Tag::Real => visitor.visit_f64(self.read_f64()?),
            Tag::True => visitor.visit_bool(true),
            Tag::False => visitor.visit_bool(false),
            Tag::Null => visitor.visit_unit(),
            Tag::Template => self.scan_template(visitor),
            Tag::Missing => Err(Error::UnexpectedTag { tag: 0x0c, context: "a value" }),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::True => visitor.visit_bool(true),
            Tag::False => visitor.visit_bool(false),
            tag => self.mismatch(tag, &"a boolean"),
        }
    }

    deserialize_number! {
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64
    }

    #[inline]
    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::String => self.scan_bytes(visitor),
            tag => self.mismatch(tag, &"a string"),
        }
    }

    #[inline]
    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    #[inline]
    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    #[inline]
    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.peek_tag()? == Tag::Null {
            self.tag = None;
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::Null => visitor.visit_unit(),
            tag => self.mismatch(tag, &"null"),
        }
    }

    #[inline]
    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(self, name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if name == TOKEN {
            let raw = self.capture_value()?;
            return visitor.visit_byte_buf(raw);
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::Array => self.scan_array(visitor),
            Tag::Template => self.scan_template(visitor),
            tag => self.mismatch(tag, &"an array"),
        }
    }

    #[inline]
    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    #[inline]
    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::Object => self.scan_object(visitor, None),
            tag => self.mismatch(tag, &"an object"),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            Tag::Object => self.scan_object(visitor, Some(FieldSet::new(fields))),
            tag => self.mismatch(tag, &"an object"),
        }
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.read_tag()? {
            // `{ "variant": payload }` form.
            Tag::Object => {
                let len = self.read_usize()?;
                if len != 1 {
                    return Err(de::Error::invalid_length(
                        len,
                        &"a single-key object for an enum variant",
                    ));
                }
                visitor.visit_enum(TaggedVariant { de: self })
            }
            // Bare `"variant"` form for unit variants.
            Tag::String => {
                let key = match self.read_str_ref()? {
                    Reference::Borrowed(s) => KeyRef::Borrowed(s),
                    Reference::Copied(s) => KeyRef::Transient(s),
                };
                visitor.visit_enum(KeyDeserializer { key })
            }
            tag => self.mismatch(tag, &"an enum variant"),
        }
    }

    #[inline]
    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let peeked = self.tag.take();
        self.skip_value(peeked)?;
        visitor.visit_unit()
    }

    #[inline]
    fn is_human_readable(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------

struct ArrayAccess<'a, R> {
    de: &'a mut Deserializer<R>,
    remaining: &'a mut usize,
}

impl<'de, 'a, R> de::SeqAccess<'de> for ArrayAccess<'a, R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: de::DeserializeSeed<'de>,
    {
        if *self.remaining == 0 {
            return Ok(None);
        }
        *self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(*self.remaining)
    }
}

// ----------------------------------------------------------------------------

struct ObjectAccess<'a, R> {
    de: &'a mut Deserializer<R>,
    remaining: &'a mut usize,
    fields: Option<FieldSet>,
}

impl<'de, 'a, R> de::MapAccess<'de> for ObjectAccess<'a, R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn next_key_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: de::DeserializeSeed<'de>,
    {
        if *self.remaining == 0 {
            return Ok(None);
        }
        *self.remaining -= 1;

        self.de.expect_tag(Tag::String, "an object key")?;
        match self.fields {
            Some(set) => {
                // Struct destination: canonicalize the wire key so the
                // derived visitor sees the declared field name.
                let canonical = {
                    let key = self.de.read_str_ref()?;
                    set.resolve(&key).ok_or_else(|| Error::UnknownField((*key).to_owned()))?
                };
                seed.deserialize(KeyDeserializer { key: KeyRef::Transient(canonical) }).map(Some)
            }
            None => {
                let key = match self.de.read_str_ref()? {
                    Reference::Borrowed(s) => KeyRef::Borrowed(s),
                    Reference::Copied(s) => KeyRef::Transient(s),
                };
                seed.deserialize(KeyDeserializer { key }).map(Some)
            }
        }
    }

    fn next_value_seed<T>(&mut self, seed: T) -> Result<T::Value>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(*self.remaining)
    }
}

// ----------------------------------------------------------------------------

/// SeqAccess over the rows of a template array. Also a `Deserializer` so each
/// row can steer itself into a map or struct visitor.
struct TemplateRows<'de, 'a, R> {
    de: &'a mut Deserializer<R>,
    keys: &'a [Cow<'de, str>],
    remaining: &'a mut usize,
}

impl<'de, 'a, R> de::SeqAccess<'de> for TemplateRows<'de, 'a, R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: de::DeserializeSeed<'de>,
    {
        if *self.remaining == 0 {
            return Ok(None);
        }
        *self.remaining -= 1;
        seed.deserialize(&mut *self).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(*self.remaining)
    }
}

impl<'de, 'a, 'b, R> de::Deserializer<'de> for &'b mut TemplateRows<'de, 'a, R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(TemplateRow { de: &mut *self.de, keys: self.keys.iter(), fields: None })
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(TemplateRow {
            de: &mut *self.de,
            keys: self.keys.iter(),
            fields: Some(FieldSet::new(fields)),
        })
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_any(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        // Rows are never null in a template array.
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf unit unit_struct seq tuple tuple_struct enum identifier
        ignored_any
    }

    #[inline]
    fn is_human_readable(&self) -> bool {
        false
    }
}

/// MapAccess for one template row: replays the key array, skipping keys whose
/// value slot holds the `0x0c` placeholder so those fields keep their
/// defaults.
struct TemplateRow<'de, 'a, R> {
    de: &'a mut Deserializer<R>,
    keys: std::slice::Iter<'a, Cow<'de, str>>,
    fields: Option<FieldSet>,
}

impl<'de, 'a, R> de::MapAccess<'de> for TemplateRow<'de, 'a, R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn next_key_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: de::DeserializeSeed<'de>,
    {
        while let Some(key) = self.keys.next() {
            if self.de.peek_tag()? == Tag::Missing {
                self.de.tag = None;
                continue;
            }

            let key_ref = match self.fields {
                Some(set) => KeyRef::Transient(
                    set.resolve(key).ok_or_else(|| Error::UnknownField(key.to_string()))?,
                ),
                None => match key {
                    Cow::Borrowed(s) => KeyRef::Borrowed(*s),
                    Cow::Owned(s) => KeyRef::Transient(s.as_str()),
                },
            };
            return seed.deserialize(KeyDeserializer { key: key_ref }).map(Some);
        }

        Ok(None)
    }

    fn next_value_seed<T>(&mut self, seed: T) -> Result<T::Value>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(&mut *self.de)
    }
}

// ----------------------------------------------------------------------------

/// EnumAccess for the `{ "variant": payload }` form.
struct TaggedVariant<'a, R> {
    de: &'a mut Deserializer<R>,
}

impl<'de, 'a, R> de::EnumAccess<'de> for TaggedVariant<'a, R>
where
    R: Read<'de>,
{
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self)>
    where
        V: de::DeserializeSeed<'de>,
    {
        self.de.expect_tag(Tag::String, "an enum variant key")?;
        let variant = {
            let key = match self.de.read_str_ref()? {
                Reference::Borrowed(s) => KeyRef::Borrowed(s),
                Reference::Copied(s) => KeyRef::Transient(s),
            };
            seed.deserialize(KeyDeserializer { key })?
        };
        Ok((variant, self))
    }
}

impl<'de, 'a, R> de::VariantAccess<'de> for TaggedVariant<'a, R>
where
    R: Read<'de>,
{
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        de::Deserialize::deserialize(self.de)
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(self.de)
    }

    fn tuple_variant<V>(self, len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_tuple(self.de, len, visitor)
    }

    fn struct_variant<V>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_struct(self.de, "", fields, visitor)
    }
}

/// VariantAccess that only admits unit variants; used when the variant came
/// from a bare string and no payload can follow.
struct UnitOnly;

impl<'de> de::VariantAccess<'de> for UnitOnly {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T>(self, _seed: T) -> Result<T::Value>
    where
        T: de::DeserializeSeed<'de>,
    {
        Err(de::Error::invalid_type(de::Unexpected::UnitVariant, &"newtype variant"))
    }

    fn tuple_variant<V>(self, _len: usize, _visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(de::Error::invalid_type(de::Unexpected::UnitVariant, &"tuple variant"))
    }

    fn struct_variant<V>(self, _fields: &'static [&'static str], _visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(de::Error::invalid_type(de::Unexpected::UnitVariant, &"struct variant"))
    }
}

// ----------------------------------------------------------------------------

enum KeyRef<'de, 'a> {
    /// Borrowed straight from the input slice.
    Borrowed(&'de str),
    /// Canonical field name or scratch-buffer copy; valid for this key only.
    Transient(&'a str),
}

/// Deserializer for a single string that is already in hand: object keys
/// (possibly canonicalized), template keys, enum variant names.
struct KeyDeserializer<'de, 'a> {
    key: KeyRef<'de, 'a>,
}

impl<'de, 'a> de::Deserializer<'de> for KeyDeserializer<'de, 'a> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.key {
            KeyRef::Borrowed(s) => visitor.visit_borrowed_str(s),
            KeyRef::Transient(s) => visitor.visit_str(s),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        // Keys are never null.
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }

    #[inline]
    fn is_human_readable(&self) -> bool {
        false
    }
}

impl<'de, 'a> de::EnumAccess<'de> for KeyDeserializer<'de, 'a> {
    type Error = Error;
    type Variant = UnitOnly;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, UnitOnly)>
    where
        V: de::DeserializeSeed<'de>,
    {
        let variant = seed.deserialize(self)?;
        Ok((variant, UnitOnly))
    }
}

// ----------------------------------------------------------------------------

/// A byte run that is either borrowed from the original input or staged in
/// the deserializer's scratch buffer.
pub enum Reference<'b, 'c, T: ?Sized + 'static> {
    /// Borrowed from the input with the input's lifetime.
    Borrowed(&'b T),
    /// Copied into scratch; valid until the next read.
    Copied(&'c T),
}

impl<'b, 'c, T: ?Sized + 'static> ops::Deref for Reference<'b, 'c, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match *self {
            Reference::Borrowed(v) => v,
            Reference::Copied(v) => v,
        }
    }
}

// ----------------------------------------------------------------------------

/// Input source abstraction, in the manner of serde_json's `Read`: slice
/// input can hand out borrows, stream input stages through scratch. The
/// record hooks feed the raw-capture path.
///
/// Sealed; implemented only by [`SliceRead`] and [`IoRead`].
pub trait Read<'de>: private::Sealed {
    #[doc(hidden)]
    fn next_u8(&mut self) -> Result<u8>;

    #[doc(hidden)]
    fn at_end(&mut self) -> Result<bool>;

    #[doc(hidden)]
    fn read_ref<'s>(
        &mut self,
        len: usize,
        scratch: &'s mut Vec<u8>,
    ) -> Result<Reference<'de, 's, [u8]>>;

    #[doc(hidden)]
    fn begin_record(&mut self, prefix: Option<u8>);

    #[doc(hidden)]
    fn end_record(&mut self) -> Vec<u8>;
}

/// BSER input source reading from a borrowed byte slice.
pub struct SliceRead<'de> {
    slice: &'de [u8],
    index: usize,
    record: Option<RecordMark>,
}

struct RecordMark {
    start: usize,
    prefix: Option<u8>,
}

impl<'de> SliceRead<'de> {
    /// Wrap a byte slice.
    pub fn new(slice: &'de [u8]) -> Self {
        SliceRead { slice, index: 0, record: None }
    }
}

impl<'de> Read<'de> for SliceRead<'de> {
    fn next_u8(&mut self) -> Result<u8> {
        let byte = *self.slice.get(self.index).ok_or(Error::Truncated { expected: 1 })?;
        self.index += 1;
        Ok(byte)
    }

    fn at_end(&mut self) -> Result<bool> {
        Ok(self.index >= self.slice.len())
    }

    fn read_ref<'s>(
        &mut self,
        len: usize,
        _scratch: &'s mut Vec<u8>,
    ) -> Result<Reference<'de, 's, [u8]>> {
        let end = self
            .index
            .checked_add(len)
            .filter(|end| *end <= self.slice.len())
            .ok_or_else(|| Error::Truncated {
                expected: len.saturating_sub(self.slice.len() - self.index),
            })?;

        let bytes = &self.slice[self.index..end];
        self.index = end;
        Ok(Reference::Borrowed(bytes))
    }

    fn begin_record(&mut self, prefix: Option<u8>) {
        self.record = Some(RecordMark { start: self.index, prefix });
    }

    fn end_record(&mut self) -> Vec<u8> {
        match self.record.take() {
            Some(mark) => {
                let mut out = Vec::with_capacity(1 + self.index - mark.start);
                out.extend(mark.prefix);
                out.extend_from_slice(&self.slice[mark.start..self.index]);
                out
            }
            None => Vec::new(),
        }
    }
}

/// BSER input source reading from an `io::Read` stream.
pub struct IoRead<R> {
    read: R,
    record: Option<Vec<u8>>,
}

impl<R> IoRead<R>
where
    R: io::Read,
{
    /// Wrap an `io::Read`.
    pub fn new(read: R) -> Self {
        IoRead { read, record: None }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Truncated { expected: buf.len() }
            } else {
                Error::Io(e)
            }
        })
    }
}

impl<'de, R> Read<'de> for IoRead<R>
where
    R: io::Read,
{
    fn next_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        if let Some(record) = &mut self.record {
            record.push(buf[0]);
        }
        Ok(buf[0])
    }

    fn at_end(&mut self) -> Result<bool> {
        let mut buf = [0u8; 1];
        match self.read.read(&mut buf) {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_ref<'s>(
        &mut self,
        len: usize,
        scratch: &'s mut Vec<u8>,
    ) -> Result<Reference<'de, 's, [u8]>> {
        scratch.resize(len, 0);
        let outcome = self.fill(&mut scratch[..]);
        if let (Ok(()), Some(record)) = (&outcome, &mut self.record) {
            record.extend_from_slice(&scratch[..]);
        }
        outcome?;
        Ok(Reference::Copied(&scratch[..]))
    }

    fn begin_record(&mut self, prefix: Option<u8>) {
        let mut record = Vec::new();
        record.extend(prefix);
        self.record = Some(record);
    }

    fn end_record(&mut self) -> Vec<u8> {
        self.record.take().unwrap_or_default()
    }
}

mod private {
    pub trait Sealed {}
}

impl<'a> private::Sealed for SliceRead<'a> {}
impl<R> private::Sealed for IoRead<R> where R: io::Read {}

// ----------------------------------------------------------------------------

/// Deserialize a BSER value from an `io::Read`.
///
/// # Errors
///
/// Fails on malformed input, a destination the value does not fit, or
/// trailing bytes after the value.
pub fn from_reader<R, T>(reader: R) -> Result<T>
where
    R: io::Read,
    T: de::DeserializeOwned,
{
    let mut de = Deserializer::from_reader(reader);
    let value = de::Deserialize::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Deserialize a BSER value from a byte slice.
///
/// # Errors
///
/// Same failure conditions as [`from_reader`].
pub fn from_slice<'de, T>(bytes: &'de [u8]) -> Result<T>
where
    T: de::Deserialize<'de>,
{
    let mut de = Deserializer::from_slice(bytes);
    let value = de::Deserialize::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}
