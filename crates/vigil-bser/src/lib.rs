//! # BSER v1: Binary Serialized Encoding Representation
//!
//! This crate implements the tag-dispatched, length-prefixed binary format
//! spoken by the Watchman file-watching service, together with the PDU
//! envelope that frames every message on the wire.
//!
//! ## Format Design
//!
//! Every value carries a single leading tag byte followed by a
//! length-dependent payload. Integers are narrowed to the smallest of four
//! signed widths whose range strictly contains the value, strings are
//! length-counted raw bytes, and arrays of uniform records can travel in a
//! compressed "template" form that lists the field names once. All multi-byte
//! quantities are little-endian.
//!
//! ## Two Decoding Paths
//!
//! - **Typed**: [`from_slice`]/[`from_reader`] drive any `serde::Deserialize`
//!   destination. Struct fields are matched against incoming object keys
//!   case-sensitively first, then ASCII-case-insensitively; a key that
//!   resolves to no field is an error.
//! - **Dynamic**: [`Value`] captures the full value universe for callers that
//!   do not know the schema ahead of time. [`Value::encode`] performs
//!   template detection for homogeneous object arrays; the typed serializer
//!   deliberately does not.
//!
//! [`RawValue`] escapes both paths: it captures (or splices) one complete
//! tagged value verbatim, which is how custom codecs plug in.
//!
//! ## Framing
//!
//! The [`frame`] module wraps and unwraps the PDU envelope: the two magic
//! bytes `00 01`, a tagged integer holding the byte length of the body, and
//! the body itself. Length fields are validated against a 16 MiB ceiling
//! before any allocation happens.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod de;
mod error;
pub mod frame;
pub(crate) mod fields;
mod raw;
mod ser;
mod tag;
mod value;

pub use de::{from_reader, from_slice, Deserializer};
pub use error::{Error, Result};
pub use raw::RawValue;
pub use ser::{to_vec, to_writer, Serializer};
pub use tag::Tag;
pub use value::Value;
