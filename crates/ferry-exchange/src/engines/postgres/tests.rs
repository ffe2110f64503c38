use ferry_core::{ColumnFilter, DialectKind, Extraction, FerryError};
use pretty_assertions::assert_eq;

use super::*;
use crate::dialect::SelectRequest;
use crate::select::select_sql;
use crate::testing::{RecordingConnection, at, orders_extraction, orders_table};

fn engine() -> PostgresExchange {
    PostgresExchange::default()
}

// ============================================================================
// Quoting and paging
// ============================================================================

#[test]
fn test_quote_identifier_doubles_quotes() {
    assert_eq!(engine().quote_identifier("order"), "\"order\"");
    assert_eq!(engine().quote_identifier("we\"ird"), "\"we\"\"ird\"");
}

#[test]
fn test_source_table_quotes_each_part() {
    assert_eq!(engine().source_table("dbo.orders"), "\"dbo\".\"orders\"");
    assert_eq!(engine().qualified_table("sales", "orders"), "\"sales\".\"orders\"");
}

#[test]
fn test_pagination_and_hint() {
    assert_eq!(engine().pagination(200, 100), "LIMIT 100 OFFSET 200");
    assert_eq!(engine().non_locking_hint(), "");
}

// ============================================================================
// Type mapping
// ============================================================================

#[test]
fn test_type_mapping() {
    let e = engine();
    assert_eq!(e.type_mapping("bool", None).unwrap(), "BOOLEAN");
    assert_eq!(e.type_mapping("int8", None).unwrap(), "SMALLINT");
    assert_eq!(e.type_mapping("int64", None).unwrap(), "BIGINT");
    assert_eq!(e.type_mapping("float64", None).unwrap(), "DOUBLE PRECISION");
    assert_eq!(e.type_mapping("string", Some(40)).unwrap(), "VARCHAR(40)");
    assert_eq!(e.type_mapping("string", None).unwrap(), "TEXT");
    assert_eq!(e.type_mapping("string", Some(-1)).unwrap(), "TEXT");
    assert_eq!(e.type_mapping("datetimetz", None).unwrap(), "TIMESTAMPTZ");
    assert_eq!(e.type_mapping("json", None).unwrap(), "JSONB");
}

#[test]
fn test_type_mapping_rejects_unknown() {
    match engine().type_mapping("geometry", None) {
        Err(FerryError::UnsupportedType { dialect, native_type }) => {
            assert_eq!(dialect, "postgres");
            assert_eq!(native_type, "geometry");
        }
        other => panic!("expected UnsupportedType, got {:?}", other),
    }
}

// ============================================================================
// Partition condition
// ============================================================================

#[test]
fn test_partition_condition_moves_back_by_window() {
    let extraction = orders_extraction(DialectKind::Postgres);
    let condition = engine()
        .partition_condition(&extraction, at(12, 0), None, None)
        .unwrap();
    assert_eq!(condition, "\"updated_at\" >= '2024-03-01 11:00:00'");
}

#[test]
fn test_partition_condition_applies_timezone_and_override() {
    let mut extraction = orders_extraction(DialectKind::Postgres);
    if let Some(origin) = extraction.origin.as_mut() {
        origin.timezone_offset_hours = -3;
    }
    let condition = engine()
        .partition_condition(&extraction, at(12, 0), None, Some(600))
        .unwrap();
    assert_eq!(condition, "\"updated_at\" >= '2024-03-01 08:50:00'");
}

#[test]
fn test_partition_condition_virtual_uses_or() {
    let extraction = Extraction::new(2, "orders", "id")
        .virtual_member("source_id", "eu", false)
        .incremental("updated_at", 3600);
    let condition = engine()
        .partition_condition(&extraction, at(12, 0), extraction.virtual_column(), None)
        .unwrap();
    assert_eq!(
        condition,
        "(\"updated_at\" >= '2024-03-01 11:00:00' OR \"source_id\" = 'eu')"
    );
}

#[test]
fn test_partition_condition_requires_filter_column() {
    let extraction = Extraction::new(3, "orders", "id");
    assert!(matches!(
        engine().partition_condition(&extraction, at(12, 0), None, None),
        Err(FerryError::Configuration(_))
    ));
}

// ============================================================================
// Select
// ============================================================================

#[test]
fn test_select_sql_full_and_partitioned() {
    let extraction = orders_extraction(DialectKind::Postgres);
    let request = SelectRequest::new(0, 100, at(12, 0));

    assert_eq!(
        select_sql(&engine(), &extraction, &request).unwrap(),
        "SELECT src.* FROM \"dbo\".\"orders\" src ORDER BY \"id\" ASC LIMIT 100 OFFSET 0"
    );
    assert_eq!(
        select_sql(&engine(), &extraction, &request.partitioned(true).next_page()).unwrap(),
        "SELECT src.* FROM \"dbo\".\"orders\" src WHERE \"updated_at\" >= '2024-03-01 11:00:00' \
         ORDER BY \"id\" DESC LIMIT 100 OFFSET 100"
    );
}

#[test]
fn test_select_sql_include_columns() {
    let extraction = orders_extraction(DialectKind::Postgres)
        .with_column_filter(ColumnFilter::Include(vec!["id".into(), "status".into()]));
    let request = SelectRequest::new(0, 10, at(12, 0));
    assert_eq!(
        select_sql(&engine(), &extraction, &request).unwrap(),
        "SELECT src.\"id\", src.\"status\" FROM \"dbo\".\"orders\" src ORDER BY \"id\" ASC LIMIT 10 OFFSET 0"
    );
}

// ============================================================================
// DDL
// ============================================================================

#[test]
fn test_create_table_sql() {
    let sql = engine()
        .create_table_sql(&orders_table(), &orders_extraction(DialectKind::Postgres))
        .unwrap();
    assert_eq!(
        sql,
        "CREATE TABLE IF NOT EXISTS \"sales\".\"orders\" (\"id\" BIGINT NOT NULL, \"status\" VARCHAR(20) NULL, \
         \"updated_at\" TIMESTAMP NULL, \"ferry_updated_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
         \"ferry_row_id\" BIGSERIAL, UNIQUE (\"id\"))"
    );
}

#[test]
fn test_create_table_sql_requires_key_column() {
    let extraction = Extraction::new(1, "orders", "order_no");
    assert!(matches!(
        engine().create_table_sql(&orders_table(), &extraction),
        Err(FerryError::Schema(_))
    ));
}

#[tokio::test]
async fn test_create_table_creates_schema_first() {
    let conn = RecordingConnection::new(DialectKind::Postgres);
    engine()
        .create_table(&orders_table(), &orders_extraction(DialectKind::Postgres), &conn)
        .await
        .unwrap();

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS \"sales\"");
    assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS \"sales\".\"orders\""));
}

#[test]
fn test_merge_statements() {
    let e = engine();
    let plan = MergePlan::new(
        &e,
        &orders_table(),
        &orders_extraction(DialectKind::Postgres),
        "\"stage\"".to_string(),
        at(12, 30),
    );

    assert_eq!(
        e.create_staging_sql(&plan),
        "CREATE TEMP TABLE \"stage\" AS SELECT \"id\", \"status\", \"updated_at\" FROM \"sales\".\"orders\" WITH NO DATA"
    );
    assert_eq!(
        e.update_sql(&plan).unwrap(),
        "UPDATE \"sales\".\"orders\" d SET \"status\" = s.\"status\", \"updated_at\" = s.\"updated_at\", \
         \"ferry_updated_at\" = '2024-03-01 12:30:00' FROM \"stage\" s WHERE d.\"id\" = s.\"id\""
    );
    assert_eq!(
        e.insert_sql(&plan),
        "INSERT INTO \"sales\".\"orders\" (\"id\", \"status\", \"updated_at\", \"ferry_updated_at\") \
         SELECT s.\"id\", s.\"status\", s.\"updated_at\", '2024-03-01 12:30:00' FROM \"stage\" s \
         WHERE NOT EXISTS (SELECT 1 FROM \"sales\".\"orders\" d WHERE d.\"id\" = s.\"id\")"
    );
    assert_eq!(e.drop_staging_sql(&plan), "DROP TABLE IF EXISTS \"stage\"");
}

// ============================================================================
// Probes
// ============================================================================

#[tokio::test]
async fn test_exists_and_count() {
    use ferry_core::Value;

    use crate::testing::query_result;

    let conn = RecordingConnection::new(DialectKind::Postgres);
    conn.respond("information_schema", query_result(&["?column?"], vec![vec![Value::Int32(1)]]));
    conn.respond("COUNT(*)", query_result(&["row_count"], vec![vec![Value::Int64(42)]]));
    let extraction = orders_extraction(DialectKind::Postgres);

    assert!(engine().exists(&extraction, &conn).await.unwrap());
    assert_eq!(engine().count_rows(&extraction, &conn).await.unwrap(), 42);

    engine().truncate(&extraction, &conn).await.unwrap();
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some("TRUNCATE TABLE \"sales\".\"orders\"")
    );
}

#[tokio::test]
async fn test_missing_table_does_not_exist() {
    let conn = RecordingConnection::new(DialectKind::Postgres);
    let extraction = orders_extraction(DialectKind::Postgres);
    assert!(!engine().exists(&extraction, &conn).await.unwrap());
}
