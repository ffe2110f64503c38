use ferry_core::{ColumnType, DataColumn, Destination, DialectKind, Extraction, Value};
use pretty_assertions::assert_eq;

use super::*;
use crate::dialect::SelectRequest;
use crate::select::select_sql;
use crate::testing::{at, orders_extraction, orders_table};

fn engine() -> SqlServerExchange {
    SqlServerExchange::default()
}

fn regional() -> Extraction {
    Extraction::new(2, "dbo.orders", "id")
        .with_alias("orders")
        .with_destination(Destination {
            id: 1,
            name: "Warehouse".into(),
            alias: "dw".into(),
            dialect: DialectKind::SqlServer,
            connection_string: String::new(),
            timezone_offset_hours: 0,
        })
        .virtual_member("source_id", "eu", true)
        .incremental("updated_at", 3600)
}

#[test]
fn test_quoting() {
    let e = engine();
    assert_eq!(e.quote_identifier("a]b"), "[a]]b]");
    assert_eq!(e.quote_string("O'Neil"), "N'O''Neil'");
    assert_eq!(e.qualified_table("dbo", "orders"), "[dbo].[orders]");
}

#[test]
fn test_pagination_and_hint() {
    assert_eq!(engine().pagination(0, 500), "OFFSET 0 ROWS FETCH NEXT 500 ROWS ONLY");
    assert_eq!(engine().non_locking_hint(), "WITH (NOLOCK)");
}

#[test]
fn test_literals() {
    let e = engine();
    assert_eq!(e.value_literal(&Value::Bool(true)), "1");
    assert_eq!(e.value_literal(&Value::Bool(false)), "0");
    assert_eq!(e.value_literal(&Value::Int32(7)), "7");
    assert_eq!(e.value_literal(&Value::DateTime(at(9, 15))), "CAST('2024-03-01 09:15:00' AS DATETIME2)");
    assert_eq!(e.timestamp_literal(at(9, 15)), "CAST('2024-03-01 09:15:00' AS DATETIME2)");
}

#[test]
fn test_type_mapping() {
    let e = engine();
    assert_eq!(e.type_mapping("bool", None).unwrap(), "BIT");
    assert_eq!(e.type_mapping("int8", None).unwrap(), "SMALLINT");
    assert_eq!(e.type_mapping("string", Some(4000)).unwrap(), "NVARCHAR(4000)");
    assert_eq!(e.type_mapping("string", Some(4001)).unwrap(), "NVARCHAR(MAX)");
    assert_eq!(e.type_mapping("uuid", None).unwrap(), "UNIQUEIDENTIFIER");
    assert_eq!(e.type_mapping("datetimetz", None).unwrap(), "DATETIMEOFFSET(7)");
    assert!(e.type_mapping("hierarchyid", None).is_err());
}

#[test]
fn test_string_key_is_bounded() {
    let column = DataColumn::new("code", ColumnType::String).with_max_length(2000);
    assert_eq!(
        engine().column_definition(&column, true).unwrap(),
        "[code] NVARCHAR(450) NOT NULL"
    );
}

#[test]
fn test_select_sql_virtual_dependency() {
    let request = SelectRequest::new(0, 100, at(12, 0)).partitioned(true);
    assert_eq!(
        select_sql(&engine(), &regional(), &request).unwrap(),
        "SELECT * FROM (SELECT src.*, N'eu' AS [source_id] FROM [dbo].[orders] src WITH (NOLOCK)) vsrc \
         WHERE ([updated_at] >= CAST('2024-03-01 11:00:00' AS DATETIME2) AND [source_id] = N'eu') \
         ORDER BY [id] DESC OFFSET 0 ROWS FETCH NEXT 100 ROWS ONLY"
    );
}

#[test]
fn test_select_sql_override_query_skips_hint() {
    let extraction = orders_extraction(DialectKind::SqlServer)
        .with_override_query("SELECT id, status FROM dbo.orders WHERE status <> 'void';");
    let request = SelectRequest::new(0, 100, at(12, 0));
    assert_eq!(
        select_sql(&engine(), &extraction, &request).unwrap(),
        "SELECT src.* FROM (SELECT id, status FROM dbo.orders WHERE status <> 'void') src \
         ORDER BY [id] ASC OFFSET 0 ROWS FETCH NEXT 100 ROWS ONLY"
    );
}

#[test]
fn test_create_schema_and_table_sql() {
    let e = engine();
    assert_eq!(
        e.create_schema_sql("sales"),
        "IF SCHEMA_ID(N'sales') IS NULL EXEC(N'CREATE SCHEMA [sales]')"
    );
    assert_eq!(
        e.create_table_sql(&orders_table(), &orders_extraction(DialectKind::SqlServer)).unwrap(),
        "IF OBJECT_ID(N'[sales].[orders]', N'U') IS NULL CREATE TABLE [sales].[orders] \
         ([id] BIGINT NOT NULL, [status] NVARCHAR(20) NULL, [updated_at] DATETIME2(7) NULL, \
         [ferry_updated_at] DATETIME2(7) NOT NULL DEFAULT SYSUTCDATETIME(), \
         [ferry_row_id] BIGINT IDENTITY(1,1) NOT NULL, CONSTRAINT [UQ_sales_orders] UNIQUE ([id]))"
    );
}

#[test]
fn test_probes() {
    let e = engine();
    assert_eq!(
        e.exists_sql("sales", "orders"),
        "SELECT 1 AS present WHERE OBJECT_ID(N'[sales].[orders]', N'U') IS NOT NULL"
    );
    assert_eq!(e.count_sql("[sales].[orders]"), "SELECT COUNT_BIG(*) AS row_count FROM [sales].[orders]");
}

#[test]
fn test_staging_table_is_global_temp() {
    let stage = engine().staging_table(&orders_extraction(DialectKind::SqlServer));
    assert!(stage.starts_with("[##ferry_stage_"), "{}", stage);
}

#[test]
fn test_merge_statements_with_virtual_key() {
    let e = engine();
    let mut table = orders_table();
    table.add_constant_column(DataColumn::new("source_id", ColumnType::String), Value::String("eu".into()));
    let plan = MergePlan::new(&e, &table, &regional(), "[##stage]".to_string(), at(12, 30));

    assert_eq!(plan.keys, vec!["id".to_string(), "source_id".to_string()]);
    assert_eq!(
        e.create_staging_sql(&plan),
        "SELECT TOP 0 [id], [status], [updated_at], [source_id] INTO [##stage] FROM [dbo].[orders]"
    );
    assert_eq!(
        e.update_sql(&plan).unwrap(),
        "UPDATE d SET d.[status] = s.[status], d.[updated_at] = s.[updated_at], \
         d.[ferry_updated_at] = CAST('2024-03-01 12:30:00' AS DATETIME2) \
         FROM [dbo].[orders] d INNER JOIN [##stage] s ON d.[id] = s.[id] AND d.[source_id] = s.[source_id]"
    );
}
