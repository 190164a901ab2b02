//! Round-trip coverage: hand-picked edge values plus property tests.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use vigil_bser::{from_slice, object, to_vec, Value};

#[test]
fn integer_endpoints_round_trip() {
    let cases = [
        0i64,
        1,
        -1,
        126,
        127,
        128,
        -127,
        -128,
        -129,
        32_766,
        32_767,
        32_768,
        -32_767,
        -32_768,
        -32_769,
        2_147_483_646,
        2_147_483_647,
        2_147_483_648,
        -2_147_483_647,
        -2_147_483_648,
        -2_147_483_649,
        i64::MAX,
        i64::MIN,
    ];
    for v in cases {
        let wire = to_vec(&v).unwrap();
        assert_eq!(from_slice::<i64>(&wire).unwrap(), v, "value {}", v);
    }
}

#[test]
fn real_edge_values_round_trip() {
    let cases = [
        0.0f64,
        -0.0,
        1.5,
        f64::MAX,
        f64::MIN,
        f64::MIN_POSITIVE,
        f64::from_bits(1), // smallest subnormal
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for v in cases {
        let wire = to_vec(&v).unwrap();
        let back = from_slice::<f64>(&wire).unwrap();
        assert_eq!(back.to_bits(), v.to_bits(), "value {}", v);
    }

    // NaN compares by bit pattern.
    let wire = to_vec(&f64::NAN).unwrap();
    let back = from_slice::<f64>(&wire).unwrap();
    assert_eq!(back.to_bits(), f64::NAN.to_bits());
}

#[test]
fn f32_widens_to_binary64() {
    let wire = to_vec(&1.25f32).unwrap();
    assert_eq!(wire[0], 0x07);
    assert_eq!(wire.len(), 9);
    assert_eq!(from_slice::<f64>(&wire).unwrap(), 1.25);
}

#[test]
fn string_lengths_round_trip() {
    for len in [0usize, 1, 255, 65_535] {
        let s = "x".repeat(len);
        let wire = to_vec(&s).unwrap();
        assert_eq!(from_slice::<String>(&wire).unwrap(), s, "length {}", len);
    }

    let unicode = "wätchmán ⌚";
    let wire = to_vec(&unicode).unwrap();
    assert_eq!(from_slice::<String>(&wire).unwrap(), unicode);
}

#[test]
fn nested_structures_round_trip() {
    let value = object! {
        "roots" => Value::Array(vec!["a".into(), "b".into()]),
        "stats" => object! {
            "watched" => 2i64,
            "uptime" => 1.5f64,
            "ok" => true,
            "last_error" => Value::Null,
        },
        "empty" => Value::Array(vec![]),
    };

    let wire = to_vec(&value).unwrap();
    assert_eq!(from_slice::<Value>(&wire).unwrap(), value);

    // The dynamic encoder agrees with the serde path for this shape.
    assert_eq!(value.encode().unwrap(), wire);
}

#[test]
fn typed_structs_round_trip() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct FileEntry {
        name: String,
        size: i64,
        exists: bool,
        mtime: Option<f64>,
    }

    let entries = vec![
        FileEntry { name: "src/lib.rs".to_owned(), size: 4_096, exists: true, mtime: Some(1.0) },
        FileEntry { name: String::new(), size: 0, exists: false, mtime: None },
    ];

    let wire = to_vec(&entries).unwrap();
    assert_eq!(from_slice::<Vec<FileEntry>>(&wire).unwrap(), entries);
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        // Finite floats only; NaN breaks equality and is covered separately.
        prop::num::f64::NORMAL.prop_map(Value::Real),
        "[ -~]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z_]{1,8}", inner), 0..4)
                .prop_map(|entries| Value::Object(
                    entries.into_iter().map(|(k, v)| (k, v)).collect()
                )),
        ]
    })
}

proptest! {
    #[test]
    fn any_value_round_trips_through_serde(value in value_strategy()) {
        let wire = to_vec(&value).unwrap();
        prop_assert_eq!(from_slice::<Value>(&wire).unwrap(), value);
    }

    #[test]
    fn any_value_round_trips_through_dynamic_encoding(value in value_strategy()) {
        // The dynamic path may pick the template representation; decoding
        // must restore the same tree either way.
        let wire = value.encode().unwrap();
        prop_assert_eq!(Value::from_slice(&wire).unwrap(), value);
    }

    #[test]
    fn integers_use_the_narrowest_strict_tag(v in any::<i64>()) {
        let wire = to_vec(&v).unwrap();
        let expected = if v > i64::from(i8::MIN) && v < i64::from(i8::MAX) {
            0x03
        } else if v > i64::from(i16::MIN) && v < i64::from(i16::MAX) {
            0x04
        } else if v > i64::from(i32::MIN) && v < i64::from(i32::MAX) {
            0x05
        } else {
            0x06
        };
        prop_assert_eq!(wire[0], expected);
        prop_assert_eq!(from_slice::<i64>(&wire).unwrap(), v);
    }

    #[test]
    fn strings_round_trip(s in "[ -~]{0,64}") {
        let wire = to_vec(&s).unwrap();
        prop_assert_eq!(from_slice::<String>(&wire).unwrap(), s);
    }
}
