use bytes::BytesMut;
use pretty_assertions::assert_eq;

use super::*;

fn numeric_bytes(text: &str) -> Vec<u8> {
    let mut out = BytesMut::new();
    encode_numeric(text, &mut out).expect("encode");
    out.to_vec()
}

// =============================================================================
// NUMERIC encoding
// =============================================================================

#[test]
fn test_encode_numeric_layout() {
    // 123.45 -> groups [123, 4500], weight 0, positive, dscale 2
    assert_eq!(
        numeric_bytes("123.45"),
        vec![0, 2, 0, 0, 0, 0, 0, 2, 0, 123, 0x11, 0x94]
    );
}

#[test]
fn test_encode_numeric_small_fraction_shifts_weight() {
    // 0.00001 -> single group 1000 at weight -2
    assert_eq!(
        numeric_bytes("0.00001"),
        vec![0, 1, 0xff, 0xfe, 0, 0, 0, 5, 0x03, 0xe8]
    );
}

#[test]
fn test_encode_numeric_zero_and_negative() {
    assert_eq!(numeric_bytes("0"), vec![0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(numeric_bytes("-10000"), vec![0, 1, 0, 1, 0x40, 0, 0, 0, 0, 1]);
}

#[test]
fn test_encode_numeric_rejects_garbage() {
    let mut out = BytesMut::new();
    assert!(encode_numeric("12a", &mut out).is_err());
    assert!(encode_numeric("", &mut out).is_err());
}

#[test]
fn test_numeric_decode_matches_encode() {
    for text in ["123.45", "-0.5", "10000", "0.00001", "98765432.1"] {
        let bytes = numeric_bytes(text);
        let decoded = PgNumericString::parse(&bytes).expect("decode");
        assert_eq!(decoded, text);
    }
}

// =============================================================================
// Parameter coercion
// =============================================================================

#[test]
fn test_integers_follow_target_width() {
    assert!(matches!(
        PgValue::from_value_for_type(&Value::Int64(7), &Type::INT4),
        PgValue::Int32(7)
    ));
    assert!(matches!(
        PgValue::from_value_for_type(&Value::Int8(7), &Type::INT8),
        PgValue::Int64(7)
    ));
}

#[test]
fn test_text_targets_stringify_anything() {
    match PgValue::from_value_for_type(&Value::Int32(42), &Type::TEXT) {
        PgValue::String(s) => assert_eq!(s, "42"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_strings_parse_into_typed_targets() {
    assert!(matches!(
        PgValue::from_value_for_type(&Value::String("2024-03-01 10:00:00".into()), &Type::TIMESTAMP),
        PgValue::DateTime(_)
    ));
    assert!(matches!(
        PgValue::from_value_for_type(&Value::String("not a date".into()), &Type::DATE),
        PgValue::String(_)
    ));
    assert!(matches!(
        PgValue::from_value_for_type(&Value::Float64(1.5), &Type::NUMERIC),
        PgValue::Numeric(_)
    ));
}

#[test]
fn test_null_is_null_for_any_target() {
    assert!(matches!(
        PgValue::from_value_for_type(&Value::Null, &Type::UUID),
        PgValue::Null
    ));
}
