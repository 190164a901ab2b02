//! Error types for the BSER codec and framer.

use std::{fmt::Display, io, str::Utf8Error};

use serde::{de, ser};
use thiserror::Error;

/// Convenient Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while encoding, decoding, or framing.
///
/// The variants group into the layers of the format: framing (prefix, length
/// header, body size), tags (unknown byte, tag illegal in context), binding
/// (the decoded value does not fit the destination), and encoding (the source
/// value cannot be represented).
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure from the reader or writer.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A PDU did not start with the `00 01` magic prefix.
    #[error("bad pdu prefix: expected [00, 01], found {found:02x?}")]
    BadPrefix {
        /// The two bytes actually read.
        found: [u8; 2],
    },

    /// The input ended before a size-framed read completed.
    #[error("truncated input: wanted {expected} more bytes")]
    Truncated {
        /// How many bytes were still owed.
        expected: usize,
    },

    /// A PDU length header exceeded the size ceiling.
    #[error("pdu length {size} exceeds the {max} byte ceiling")]
    PduTooLarge {
        /// Length claimed by the header.
        size: usize,
        /// The enforced maximum.
        max: usize,
    },

    /// The PDU length header carried a non-integer tag.
    #[error("pdu length has non-integer tag {tag:#04x}")]
    InvalidLengthTag {
        /// The offending tag byte.
        tag: u8,
    },

    /// A tag byte outside the BSER table.
    #[error("invalid tag {tag:#04x}")]
    InvalidTag {
        /// The offending byte.
        tag: u8,
    },

    /// A known tag appeared where the grammar does not allow it, e.g. the
    /// `0x0c` placeholder outside a template row.
    #[error("tag {tag:#04x} is not valid while decoding {context}")]
    UnexpectedTag {
        /// The offending tag byte.
        tag: u8,
        /// What the decoder was in the middle of.
        context: &'static str,
    },

    /// An object key resolved to no field of the destination struct.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// A map key serialized as something other than a string.
    #[error("map key must serialize as a string")]
    NonStringKey,

    /// An unsigned value above `i64::MAX`; the wire only carries signed
    /// integers.
    #[error("integer {0} overflows the signed 64-bit wire range")]
    IntegerOverflow(u64),

    /// A sequence or map was serialized without an up-front length.
    #[error("cannot serialize a sequence of unknown length")]
    LengthRequired,

    /// A length field decoded to a negative value.
    #[error("negative length {0}")]
    NegativeLength(i64),

    /// Bytes remained after the top-level value was fully decoded.
    #[error("trailing bytes after the top-level value")]
    TrailingBytes,

    /// A string value held invalid UTF-8.
    #[error("invalid utf-8 in string value: {0}")]
    Utf8(#[from] Utf8Error),

    /// Type-mismatch and other binding diagnostics produced through serde.
    #[error("{0}")]
    Message(String),
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}
