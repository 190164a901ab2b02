//! Async PDU framing over tokio streams.
//!
//! The sync framer in `vigil_bser::frame` covers `std::io`; the client's
//! tasks read and write tokio streams, so the envelope logic is restated here
//! in terms of `AsyncRead`/`AsyncWrite`. Header validation (integer tags
//! only, 16 MiB ceiling, no negative lengths) is shared with the sync side.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vigil_bser::frame;

use crate::error::{Error, Result};

/// Read one PDU from the stream and return its body.
///
/// # Errors
///
/// Framing violations (bad prefix, non-integer length tag, oversized or
/// negative length) surface as [`Error::Codec`]; stream failures, including
/// EOF mid-PDU, as [`Error::Transport`].
pub async fn read_pdu<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix).await?;
    if prefix != frame::PDU_PREFIX {
        return Err(Error::Codec(vigil_bser::Error::BadPrefix { found: prefix }));
    }

    let tag = reader.read_u8().await?;
    let width = frame::length_width(tag).map_err(Error::Codec)?;

    let mut len_bytes = [0u8; 8];
    reader.read_exact(&mut len_bytes[..width]).await?;
    let len = frame::decode_length(&len_bytes[..width]).map_err(Error::Codec)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

/// Encode `value` and write it to the stream as one PDU.
pub async fn write_pdu<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize + ?Sized,
{
    let wire = frame::pdu_vec(value).map_err(Error::Codec)?;
    writer.write_all(&wire).await?;
    Ok(())
}

/// [`write_pdu`] for a dynamic [`Value`](vigil_bser::Value), using the
/// template-compressing encoder.
pub async fn write_pdu_value<W>(writer: &mut W, value: &vigil_bser::Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let wire = frame::pdu_vec_value(value).map_err(Error::Codec)?;
    writer.write_all(&wire).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_bser::{object, Value};

    #[tokio::test]
    async fn pdu_round_trip_over_a_duplex_pair() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        let value = object! { "version" => "4.9.0", "clock" => "c:1:2" };
        write_pdu_value(&mut a, &value).await.unwrap();

        let body = read_pdu(&mut b).await.unwrap();
        assert_eq!(Value::from_slice(&body).unwrap(), value);
    }

    #[tokio::test]
    async fn bad_prefix_is_a_codec_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut a, &[0xde, 0xad, 0x03, 0x00]).await.unwrap();

        let err = read_pdu(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::Codec(vigil_bser::Error::BadPrefix { .. })));
    }

    #[tokio::test]
    async fn eof_mid_body_is_a_transport_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        // Claims 10 body bytes, delivers 2, then closes.
        tokio::io::AsyncWriteExt::write_all(&mut a, &[0x00, 0x01, 0x03, 0x0a, 0x01, 0x02])
            .await
            .unwrap();
        drop(a);

        let err = read_pdu(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
