//! Destination-binding behavior: key matching, raw capture, stream position.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vigil_bser::{from_slice, object, to_vec, Error, RawValue, Value};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Response {
    #[serde(rename = "Name")]
    name: String,
    version: String,
}

#[test]
fn incoming_keys_fold_case_against_declared_fields() {
    let wire = to_vec(&object! { "name" => "fred", "VERSION" => "4.9.0" }).unwrap();
    let resp: Response = from_slice(&wire).unwrap();
    assert_eq!(resp, Response { name: "fred".to_owned(), version: "4.9.0".to_owned() });
}

#[test]
fn exact_match_is_preferred_over_case_insensitive() {
    let wire = to_vec(&object! { "Name" => "exact", "version" => "v" }).unwrap();
    let resp: Response = from_slice(&wire).unwrap();
    assert_eq!(resp.name, "exact");
}

#[test]
fn unknown_keys_are_binding_errors() {
    let wire = to_vec(&object! { "Name" => "fred", "version" => "v", "extra" => 1i64 }).unwrap();
    let err = from_slice::<Response>(&wire).unwrap_err();
    assert!(matches!(err, Error::UnknownField(key) if key == "extra"));
}

#[test]
fn maps_accept_any_keys() {
    let wire = to_vec(&object! { "whatever" => 1i64, "else" => 2i64 }).unwrap();
    let map: HashMap<String, i64> = from_slice(&wire).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map["whatever"], 1);
}

#[test]
fn null_into_a_non_nullable_destination_is_rejected() {
    let wire = to_vec(&Value::Null).unwrap();
    assert!(from_slice::<String>(&wire).is_err());
    assert!(from_slice::<i64>(&wire).is_err());
    assert!(from_slice::<bool>(&wire).is_err());

    // The nullable forms accept it.
    assert_eq!(from_slice::<Option<String>>(&wire).unwrap(), None);
    assert_eq!(from_slice::<Value>(&wire).unwrap(), Value::Null);
    assert_eq!(from_slice::<()>(&wire).unwrap(), ());
}

#[test]
fn bool_into_non_bool_destination_is_rejected() {
    let wire = to_vec(&true).unwrap();
    assert!(from_slice::<i64>(&wire).is_err());
    assert!(from_slice::<String>(&wire).is_err());
    assert_eq!(from_slice::<bool>(&wire).unwrap(), true);
}

#[test]
fn narrow_wire_integers_widen_into_any_integer_destination() {
    let wire = to_vec(&42i64).unwrap(); // Int8 on the wire
    assert_eq!(from_slice::<i8>(&wire).unwrap(), 42);
    assert_eq!(from_slice::<i64>(&wire).unwrap(), 42);
    assert_eq!(from_slice::<u16>(&wire).unwrap(), 42);

    // A value outside the destination's range does not fit.
    let wide = to_vec(&40_000i64).unwrap();
    assert!(from_slice::<i8>(&wide).is_err());
    assert_eq!(from_slice::<i64>(&wide).unwrap(), 40_000);

    // Negative wire values cannot land in unsigned destinations.
    let negative = to_vec(&-5i64).unwrap();
    assert!(from_slice::<u64>(&negative).is_err());
}

#[test]
fn fixed_arity_destinations_leave_the_stream_positioned() {
    // The wire array carries four elements; the destination takes two. The
    // extras must be consumed so the top-level decode sees no trailing bytes.
    let wire = to_vec(&[1i64, 2, 3, 4]).unwrap();
    let pair: (i64, i64) = from_slice(&wire).unwrap();
    assert_eq!(pair, (1, 2));

    // And nested: the outer value after the array decodes correctly.
    #[derive(Debug, PartialEq, Deserialize)]
    struct Holder {
        pair: (i64, i64),
        after: String,
    }
    let wire =
        to_vec(&object! { "pair" => Value::Array(vec![1i64.into(), 2i64.into(), 3i64.into()]),
            "after" => "ok" })
        .unwrap();
    let holder: Holder = from_slice(&wire).unwrap();
    assert_eq!(holder, Holder { pair: (1, 2), after: "ok".to_owned() });

    // Too few elements is a binding error, not silent padding.
    let short = to_vec(&[1i64]).unwrap();
    assert!(from_slice::<(i64, i64)>(&short).is_err());
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut wire = to_vec(&1i64).unwrap();
    wire.push(0x0a);
    assert!(matches!(from_slice::<i64>(&wire), Err(Error::TrailingBytes)));
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Envelope {
    kind: String,
    payload: RawValue,
}

#[test]
fn raw_value_captures_exact_bytes() {
    let inner = object! { "files" => Value::Array(vec!["a".into(), "b".into()]), "n" => 300i64 };
    let wire = to_vec(&object! { "kind" => "event", "payload" => inner.clone() }).unwrap();

    let envelope: Envelope = from_slice(&wire).unwrap();
    assert_eq!(envelope.kind, "event");

    // The captured bytes are exactly the encoding of the inner value,
    // leading tag included.
    assert_eq!(envelope.payload.as_bytes(), to_vec(&inner).unwrap().as_slice());
    assert_eq!(envelope.payload.to_value().unwrap(), inner);

    // Re-serializing splices the bytes back verbatim.
    let round = to_vec(&envelope).unwrap();
    assert_eq!(round, wire);
}

#[test]
fn raw_value_captures_from_streams_too() {
    let inner = object! { "deep" => Value::Array(vec![object! { "x" => 1i64 }, Value::Null]) };
    let wire = to_vec(&object! { "kind" => "k", "payload" => inner.clone() }).unwrap();

    let envelope: Envelope = vigil_bser::from_reader(wire.as_slice()).unwrap();
    assert_eq!(envelope.payload.to_value().unwrap(), inner);
}

#[test]
fn raw_value_round_trips_a_template() {
    let rows = Value::Array(vec![
        object! { "name" => "a", "size" => 1i64 },
        object! { "name" => "b", "size" => 2i64 },
    ]);
    let body = rows.encode().unwrap();
    assert_eq!(body[0], 0x0b);

    let raw: RawValue = from_slice(&body).unwrap();
    assert_eq!(raw.as_bytes(), body.as_slice());
    assert_eq!(raw.to_value().unwrap(), rows);
}

#[test]
fn enums_travel_as_strings_or_single_key_objects() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Mode {
        #[serde(rename = "off")]
        Off,
        #[serde(rename = "level")]
        Level(i64),
    }

    let unit = to_vec(&Mode::Off).unwrap();
    assert_eq!(from_slice::<Mode>(&unit).unwrap(), Mode::Off);

    let newtype = to_vec(&Mode::Level(3)).unwrap();
    assert_eq!(from_slice::<Mode>(&newtype).unwrap(), Mode::Level(3));
}

#[test]
fn unsigned_values_above_i64_max_cannot_encode() {
    assert!(matches!(to_vec(&(i64::MAX as u64 + 1)), Err(Error::IntegerOverflow(_))));
    assert!(to_vec(&(i64::MAX as u64)).is_ok());
}

#[test]
fn invalid_tags_are_rejected() {
    for byte in [0x0du8, 0x20, 0xff] {
        let err = from_slice::<Value>(&[byte]).unwrap_err();
        assert!(matches!(err, Error::InvalidTag { tag } if tag == byte));
    }
}
