//! Error types for the client.
//!
//! Codec failures keep their structure from the wire-format crate; transport
//! failures stay `io::Error`; a server-reported failure carries the server's
//! diagnostic verbatim. `Closed` is its own variant so callers can tell a
//! torn-down client from a broken one.

use thiserror::Error;

/// Convenient Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a client operation can fail with.
#[derive(Error, Debug)]
pub enum Error {
    /// Encoding, decoding, or framing failed.
    #[error("codec: {0}")]
    Codec(#[from] vigil_bser::Error),

    /// The underlying stream reported an I/O failure.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// The response carried a non-empty `error` field; the message is the
    /// server's diagnostic, unaltered.
    #[error("watchman: {0}")]
    Server(String),

    /// The operation was submitted to a client that has been closed, or the
    /// connection went away underneath it.
    #[error("client is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_surface_the_diagnostic_verbatim() {
        let err = Error::Server("unable to resolve root /nope: directory missing".to_owned());
        assert_eq!(
            err.to_string(),
            "watchman: unable to resolve root /nope: directory missing"
        );
    }

    #[test]
    fn codec_errors_convert_losslessly() {
        let err: Error = vigil_bser::Error::InvalidTag { tag: 0x7f }.into();
        assert!(matches!(err, Error::Codec(vigil_bser::Error::InvalidTag { tag: 0x7f })));
    }
}
