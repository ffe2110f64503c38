use pretty_assertions::assert_eq;

use super::*;
use crate::bulk::{build_row, layout_query, plan_layout};

// =============================================================================
// Reading
// =============================================================================

#[test]
fn test_column_data_to_value_scalars() {
    assert_eq!(column_data_to_value(ColumnData::I32(Some(7))).expect("convert"), Value::Int32(7));
    assert_eq!(column_data_to_value(ColumnData::U8(Some(200))).expect("convert"), Value::Int16(200));
    assert_eq!(column_data_to_value(ColumnData::String(None)).expect("convert"), Value::Null);
    assert_eq!(
        column_data_to_value(ColumnData::Numeric(Some(Numeric::new_with_scale(12345, 2))))
            .expect("convert"),
        Value::Decimal("123.45".into())
    );
}

#[test]
fn test_params_keep_temporal_types() {
    let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(14, 30, 0))
        .expect("valid datetime");
    let params = values_to_tiberius_params(&[Value::DateTime(dt), Value::Json(serde_json::json!({"a": 1}))]);
    assert!(matches!(params[0], TiberiusParam::DateTime(_)));
    assert!(matches!(&params[1], TiberiusParam::String(s) if s == r#"{"a":1}"#));
}

// =============================================================================
// Bulk coercion
// =============================================================================

#[test]
fn test_parse_scaled() {
    assert_eq!(parse_scaled("123.456", 2), Some(12345));
    assert_eq!(parse_scaled("-0.5", 3), Some(-500));
    assert_eq!(parse_scaled("42", 0), Some(42));
    assert_eq!(parse_scaled("abc", 2), None);
    assert_eq!(parse_scaled("", 2), None);
}

#[test]
fn test_integers_narrow_to_column_width() {
    assert!(matches!(
        value_to_column_data(&Value::Int64(12), SqlKind::Int).expect("fits"),
        ColumnData::I32(Some(12))
    ));
    assert!(value_to_column_data(&Value::Int64(i64::MAX), SqlKind::Int).is_err());
    assert!(matches!(
        value_to_column_data(&Value::Float64(3.0), SqlKind::BigInt).expect("whole float"),
        ColumnData::I64(Some(3))
    ));
}

#[test]
fn test_nulls_are_typed_for_the_column() {
    assert!(matches!(
        value_to_column_data(&Value::Null, SqlKind::DateTime2).expect("null"),
        ColumnData::DateTime2(None)
    ));
    assert!(matches!(
        value_to_column_data(&Value::Null, SqlKind::Decimal { scale: 2 }).expect("null"),
        ColumnData::Numeric(None)
    ));
}

#[test]
fn test_text_columns_accept_any_value() {
    match value_to_column_data(&Value::Int32(5), SqlKind::Text).expect("text") {
        ColumnData::String(Some(s)) => assert_eq!(s, "5"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_strings_parse_into_timestamps() {
    assert!(matches!(
        value_to_column_data(&Value::String("2024-03-01 10:00:00".into()), SqlKind::DateTime2)
            .expect("timestamp"),
        ColumnData::DateTime2(Some(_))
    ));
    assert!(value_to_column_data(&Value::String("soon".into()), SqlKind::DateTime2).is_err());
}

// =============================================================================
// Bulk layout
// =============================================================================

#[test]
fn test_layout_query_targets_tempdb_for_temp_tables() {
    let (sql, object) = layout_query("[#stg_orders]");
    assert!(sql.contains("tempdb.sys.columns"));
    assert_eq!(object, "tempdb..[#stg_orders]");

    let (sql, object) = layout_query("[sales].[orders]");
    assert!(sql.contains(" sys.columns"));
    assert_eq!(object, "[sales].[orders]");
}

#[test]
fn test_rows_follow_table_order_and_fill_missing() {
    let layout = plan_layout(
        vec![
            ("Id".to_string(), "bigint".to_string(), 0),
            ("Name".to_string(), "nvarchar".to_string(), 0),
            ("Note".to_string(), "nvarchar".to_string(), 0),
        ],
        &["name".to_string(), "id".to_string()],
    );
    assert_eq!(layout[0].source, Some(1));
    assert_eq!(layout[2].source, None);

    let row = build_row(&layout, &[Value::String("x".into()), Value::Int64(1)]).expect("row");
    assert_eq!(row.len(), 3);
}
