use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_compact_body_keeps_shape_when_empty() {
    let body = "[\"id\",\"name\"]\n[\"UInt64\",\"Nullable(String)\"]\n";
    let (columns, rows) = parse_compact_body(body).expect("parse");

    assert_eq!(columns.len(), 2);
    assert_eq!(columns[1].name, "name");
    assert!(columns[1].nullable);
    assert!(rows.is_empty());
}

#[test]
fn test_compact_body_typed_values() {
    let body = concat!(
        "[\"id\",\"at\",\"amount\",\"code\"]\n",
        "[\"UInt64\",\"DateTime64(3)\",\"Decimal(18, 2)\",\"LowCardinality(Nullable(FixedString(3)))\"]\n",
        "[\"18446744073709551615\",\"2024-03-01 10:00:00.000\",12.5,null]\n",
        "[\"7\",\"2024-03-01 11:00:00.000\",1,\"abc\"]\n",
    );
    let (columns, rows) = parse_compact_body(body).expect("parse");

    assert_eq!(columns[3].max_length, Some(3));
    assert_eq!(rows[0].values[0], Value::Decimal("18446744073709551615".into()));
    assert!(matches!(rows[0].values[1], Value::DateTime(_)));
    assert_eq!(rows[0].values[2], Value::Decimal("12.5".into()));
    assert_eq!(rows[0].values[3], Value::Null);
    assert_eq!(rows[1].values[0], Value::Int64(7));
    assert_eq!(rows[1].values[3], Value::String("abc".into()));
}

#[test]
fn test_untyped_json_conversion() {
    assert_eq!(json_to_value(&json!(3)), Value::Int64(3));
    assert_eq!(json_to_value(&json!(1.5)), Value::Float64(1.5));
    assert_eq!(json_to_value(&json!([1, 2])), Value::Json(json!([1, 2])));
}

// =============================================================================
// Encoding
// =============================================================================

#[test]
fn test_literals_and_markers() {
    assert_eq!(value_to_clickhouse_literal(&Value::String("it's".into())), "'it\\'s'");
    assert_eq!(
        bind_literals("SELECT * FROM t WHERE a = ? AND b = '?'", &[Value::Int32(1)]),
        "SELECT * FROM t WHERE a = 1 AND b = '?'"
    );
    assert_eq!(escape_bind_markers("SELECT 'why?'"), "SELECT 'why??'");
}

#[test]
fn test_json_each_row_lines() {
    let body = json_each_row(
        &["id".to_string(), "note".to_string()],
        &[vec![Value::Int64(1), Value::String("a?".into())], vec![Value::Int64(2), Value::Null]],
    );
    assert_eq!(body, "{\"id\":1,\"note\":\"a?\"}\n{\"id\":2,\"note\":null}\n");
}
