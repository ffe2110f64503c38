use pretty_assertions::assert_eq;

use super::*;

// =============================================================================
// Literals
// =============================================================================

#[test]
fn test_string_literals_are_escaped() {
    assert_eq!(
        value_to_mysql_literal(&Value::String("O'Brien \\ co".into())),
        "'O''Brien \\\\ co'"
    );
    assert_eq!(value_to_mysql_literal(&Value::Bytes(vec![0xde, 0xad])), "X'dead'");
    assert_eq!(value_to_mysql_literal(&Value::Null), "NULL");
}

#[test]
fn test_non_finite_floats_become_null() {
    assert_eq!(value_to_mysql_literal(&Value::Float64(f64::NAN)), "NULL");
    assert_eq!(value_to_mysql_literal(&Value::Float64(2.5)), "2.5");
}

#[test]
fn test_datetime_literal_keeps_fraction() {
    let dt = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_micro_opt(10, 0, 0, 250_000))
        .expect("valid datetime");
    assert_eq!(
        value_to_mysql_literal(&Value::DateTime(dt)),
        "'2024-03-01 10:00:00.250'"
    );
}

#[test]
fn test_bind_literals_skips_quoted_question_marks() {
    let sql = bind_literals(
        "SELECT '?' AS q, `a?` FROM t WHERE id = ? AND name = ?",
        &[Value::Int64(5), Value::String("x".into())],
    );
    assert_eq!(sql, "SELECT '?' AS q, `a?` FROM t WHERE id = 5 AND name = 'x'");
}

// =============================================================================
// Chunking
// =============================================================================

#[test]
fn test_chunk_size_respects_value_limit() {
    assert_eq!(bulk_chunk_size(3), 1000);
    assert_eq!(bulk_chunk_size(100), 655);
    assert_eq!(bulk_chunk_size(70_000), 1);
    assert_eq!(bulk_chunk_size(0), 1000);
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_text_protocol_values_follow_column_type() {
    let int = mysql_value_to_value(mysql_async::Value::Bytes(b"42".to_vec()), ColumnType::MYSQL_TYPE_LONG);
    assert_eq!(int, Value::Int64(42));

    let decimal = mysql_value_to_value(
        mysql_async::Value::Bytes(b"10.50".to_vec()),
        ColumnType::MYSQL_TYPE_NEWDECIMAL,
    );
    assert_eq!(decimal, Value::Decimal("10.50".into()));

    let ts = mysql_value_to_value(
        mysql_async::Value::Bytes(b"2024-03-01 10:00:00".to_vec()),
        ColumnType::MYSQL_TYPE_DATETIME,
    );
    assert!(matches!(ts, Value::DateTime(_)));
}

#[test]
fn test_zero_date_is_null() {
    let zero = mysql_value_to_value(
        mysql_async::Value::Date(0, 0, 0, 0, 0, 0, 0),
        ColumnType::MYSQL_TYPE_DATETIME,
    );
    assert_eq!(zero, Value::Null);
}

#[test]
fn test_collation_byte_width() {
    assert_eq!(bytes_per_char(255), 4);
    assert_eq!(bytes_per_char(33), 3);
    assert_eq!(bytes_per_char(63), 1);
}
