//! PDU framing: the envelope around every message on the wire.
//!
//! A PDU is `00 01`, a tagged integer holding the byte length of the body,
//! then exactly that many bytes encoding one value. The length header uses
//! the same fitting rule as any other integer and only integer tags are legal
//! there.
//!
//! Length fields are validated against [`MAX_PDU_SIZE`] before any body
//! allocation happens, so a corrupt or hostile header cannot ask for
//! gigabytes.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::ser::Serialize;

use crate::{
    error::{Error, Result},
    ser::Serializer,
    tag::Tag,
};

/// The two magic bytes opening every PDU.
pub const PDU_PREFIX: [u8; 2] = [0x00, 0x01];

/// Ceiling on the body length a PDU header may claim: 16 MiB.
pub const MAX_PDU_SIZE: usize = 16 * 1024 * 1024;

/// Writes values to an output stream as framed PDUs.
pub struct Encoder<W> {
    writer: W,
}

impl<W> Encoder<W>
where
    W: io::Write,
{
    /// Create an encoder writing to `writer`.
    pub fn new(writer: W) -> Self {
        Encoder { writer }
    }

    /// Encode `value` and write it as one PDU.
    pub fn encode<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.writer.write_all(&pdu_vec(value)?)?;
        Ok(())
    }

    /// Encode a dynamic [`Value`](crate::Value) as one PDU, with template
    /// compression.
    pub fn encode_value(&mut self, value: &crate::Value) -> Result<()> {
        self.writer.write_all(&pdu_vec_value(value)?)?;
        Ok(())
    }
}

/// Reads framed PDUs from an input stream and decodes them.
pub struct Decoder<R> {
    reader: R,
}

impl<R> Decoder<R>
where
    R: io::Read,
{
    /// Create a decoder reading from `reader`.
    pub fn new(reader: R) -> Self {
        Decoder { reader }
    }

    /// Read the next PDU and decode its body into `T`.
    pub fn decode<T>(&mut self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = read_pdu(&mut self.reader)?;
        crate::from_slice(&body)
    }

    /// Read the next PDU and return its body undecoded.
    pub fn decode_raw(&mut self) -> Result<Vec<u8>> {
        read_pdu(&mut self.reader)
    }
}

/// Assemble one complete PDU for `value` in a single buffer.
pub fn pdu_vec<T: ?Sized>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    let body = crate::to_vec(value)?;
    envelope(body)
}

/// [`pdu_vec`] for a dynamic [`Value`](crate::Value); uses the
/// template-compressing encoder.
pub fn pdu_vec_value(value: &crate::Value) -> Result<Vec<u8>> {
    let body = value.encode()?;
    envelope(body)
}

fn envelope(body: Vec<u8>) -> Result<Vec<u8>> {
    // Prefix + worst-case length header, then the body.
    let mut out = Vec::with_capacity(body.len() + 11);
    out.extend_from_slice(&PDU_PREFIX);
    Serializer::new(&mut out).write_len(body.len())?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Read one PDU from a stream and return its body.
///
/// # Errors
///
/// Fails on a bad magic prefix, a non-integer length tag, a length beyond
/// [`MAX_PDU_SIZE`], or a short read.
pub fn read_pdu<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: io::Read,
{
    let mut prefix = [0u8; 2];
    read_fill(reader, &mut prefix)?;
    if prefix != PDU_PREFIX {
        return Err(Error::BadPrefix { found: prefix });
    }

    let mut tag_byte = [0u8; 1];
    read_fill(reader, &mut tag_byte)?;
    let width = length_width(tag_byte[0])?;

    let mut len_bytes = [0u8; 8];
    read_fill(reader, &mut len_bytes[..width])?;
    let len = decode_length(&len_bytes[..width])?;

    let mut body = vec![0u8; len];
    read_fill(reader, &mut body)?;
    Ok(body)
}

/// Try to carve one complete PDU body out of an accumulation buffer.
///
/// Returns `Ok(None)` when the buffer does not yet hold a whole PDU; the
/// caller appends more bytes and retries. On success the consumed bytes are
/// drained from the buffer.
pub fn split_pdu(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < 3 {
        return Ok(None);
    }
    if buf[..2] != PDU_PREFIX {
        return Err(Error::BadPrefix { found: [buf[0], buf[1]] });
    }

    let width = length_width(buf[2])?;
    if buf.len() < 3 + width {
        return Ok(None);
    }
    let len = decode_length(&buf[3..3 + width])?;

    let total = 3 + width + len;
    if buf.len() < total {
        return Ok(None);
    }

    let mut pdu = buf.split_to(total);
    pdu.advance(3 + width);
    Ok(Some(pdu.freeze()))
}

/// Payload width of a PDU length header given its tag byte.
///
/// Only the four integer tags are legal in the length position.
pub fn length_width(byte: u8) -> Result<usize> {
    Tag::from_byte(byte)
        .and_then(Tag::int_width)
        .ok_or(Error::InvalidLengthTag { tag: byte })
}

/// Decode a little-endian length payload of 1, 2, 4, or 8 bytes, enforcing
/// non-negativity and the [`MAX_PDU_SIZE`] ceiling.
pub fn decode_length(bytes: &[u8]) -> Result<usize> {
    let len = match bytes.len() {
        1 => i64::from(bytes[0] as i8),
        2 => i64::from(LittleEndian::read_i16(bytes)),
        4 => i64::from(LittleEndian::read_i32(bytes)),
        _ => LittleEndian::read_i64(bytes),
    };

    let len = usize::try_from(len).map_err(|_| Error::NegativeLength(len))?;
    if len > MAX_PDU_SIZE {
        return Err(Error::PduTooLarge { size: len, max: MAX_PDU_SIZE });
    }
    Ok(len)
}

fn read_fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: io::Read,
{
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated { expected: buf.len() }
        } else {
            Error::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdu_round_trip_through_encoder_and_decoder() {
        let mut wire = Vec::new();
        let mut enc = Encoder::new(&mut wire);
        enc.encode(&("version",)).unwrap();
        enc.encode(&123i64).unwrap();

        let mut dec = Decoder::new(wire.as_slice());
        let first: (String,) = dec.decode().unwrap();
        assert_eq!(first.0, "version");
        let second: i64 = dec.decode().unwrap();
        assert_eq!(second, 123);
    }

    #[test]
    fn read_pdu_rejects_bad_prefix() {
        let err = read_pdu(&mut &[0x01u8, 0x00, 0x03, 0x00][..]).unwrap_err();
        assert!(matches!(err, Error::BadPrefix { found: [0x01, 0x00] }));
    }

    #[test]
    fn read_pdu_rejects_non_integer_length_tag() {
        // String tag where the length integer belongs.
        let err = read_pdu(&mut &[0x00u8, 0x01, 0x02, 0x00][..]).unwrap_err();
        assert!(matches!(err, Error::InvalidLengthTag { tag: 0x02 }));
    }

    #[test]
    fn read_pdu_rejects_oversized_length() {
        let mut wire = vec![0x00, 0x01, 0x05];
        wire.extend_from_slice(&(MAX_PDU_SIZE as i32 + 1).to_le_bytes());
        let err = read_pdu(&mut wire.as_slice()).unwrap_err();
        assert!(matches!(err, Error::PduTooLarge { .. }));
    }

    #[test]
    fn read_pdu_rejects_negative_length() {
        let wire = [0x00u8, 0x01, 0x03, 0xff];
        let err = read_pdu(&mut &wire[..]).unwrap_err();
        assert!(matches!(err, Error::NegativeLength(-1)));
    }

    #[test]
    fn read_pdu_reports_short_body() {
        // Header claims 5 bytes, only 2 present.
        let wire = [0x00u8, 0x01, 0x03, 0x05, 0x0a, 0x0a];
        let err = read_pdu(&mut &wire[..]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn split_pdu_waits_for_a_whole_frame() {
        let full = pdu_vec(&("hello", 42i64)).unwrap();

        let mut buf = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let got = split_pdu(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(got.is_none(), "premature PDU after {} bytes", i + 1);
            } else {
                let body = got.expect("complete PDU");
                assert_eq!(&body[..], &full[full.len() - body.len()..]);
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn split_pdu_handles_back_to_back_frames() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&pdu_vec(&1i64).unwrap());
        buf.extend_from_slice(&pdu_vec(&2i64).unwrap());

        let first = split_pdu(&mut buf).unwrap().expect("first PDU");
        let second = split_pdu(&mut buf).unwrap().expect("second PDU");
        assert_eq!(crate::from_slice::<i64>(&first).unwrap(), 1);
        assert_eq!(crate::from_slice::<i64>(&second).unwrap(), 2);
        assert!(split_pdu(&mut buf).unwrap().is_none());
    }
}
