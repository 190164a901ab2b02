//! Decoder and framer fuzzer.
//!
//! Feeds arbitrary bytes through every parsing surface and checks three
//! invariants:
//! - No parse panics, ever; malformed input must come back as `Err`.
//! - A value that parses must re-encode without panicking.
//! - The re-encoded bytes must parse back to the same value (the encoder may
//!   legally pick different integer widths or the template representation, so
//!   bytes are not compared, values are).

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use vigil_bser::{frame, RawValue, Value};

fuzz_target!(|data: &[u8]| {
    // Bare value decode.
    if let Ok(value) = vigil_bser::from_slice::<Value>(data) {
        let reencoded = value.encode().expect("decoded value should re-encode");
        let back = Value::from_slice(&reencoded).expect("re-encoded value should decode");
        assert_eq!(back, value, "value round-trip must be identity");

        let plain = vigil_bser::to_vec(&value).expect("serde path should encode");
        let back = Value::from_slice(&plain).expect("serde encoding should decode");
        assert_eq!(back, value);
    }

    // Raw capture walks the same grammar with the skip parser; both paths
    // must agree on validity.
    let raw_ok = vigil_bser::from_slice::<RawValue>(data).is_ok();
    let value_ok = vigil_bser::from_slice::<Value>(data).is_ok();
    if raw_ok != value_ok {
        // The skip parser does not inspect string contents, so bytes whose
        // only defect is invalid UTF-8 capture fine but fail value decoding.
        assert!(raw_ok && !value_ok, "capture must never accept less than decode");
    }

    // PDU framing from a stream.
    let mut reader = data;
    let _ = frame::read_pdu(&mut reader);

    // Incremental framing, fed in two arbitrary chunks.
    let split = data.first().copied().unwrap_or(0) as usize % (data.len() + 1);
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&data[..split]);
    let first = frame::split_pdu(&mut buf);
    buf.extend_from_slice(&data[split..]);
    match (first, frame::split_pdu(&mut buf)) {
        (Ok(Some(a)), _) => {
            // A PDU carved from a prefix must also be carved from the whole.
            let mut whole = BytesMut::from(data);
            let b = frame::split_pdu(&mut whole)
                .expect("whole buffer must frame")
                .expect("whole buffer must hold the same PDU");
            assert_eq!(a, b);
        }
        (Ok(None), _) | (Err(_), _) => {}
    }
});
