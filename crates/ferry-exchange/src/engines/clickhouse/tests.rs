use ferry_core::{ColumnType, DataColumn, DialectKind, Extraction, Value};
use pretty_assertions::assert_eq;

use super::*;
use crate::dialect::SelectRequest;
use crate::select::select_sql;
use crate::testing::{at, orders_extraction, orders_table};

fn engine() -> ClickHouseExchange {
    ClickHouseExchange::default()
}

#[test]
fn test_quoting_and_literals() {
    let e = engine();
    assert_eq!(e.quote_identifier("a`b"), "`a\\`b`");
    assert_eq!(e.quote_string("it's"), "'it\\'s'");
    assert_eq!(e.timestamp_literal(at(11, 0)), "toDateTime('2024-03-01 11:00:00')");
    assert_eq!(e.value_literal(&Value::DateTime(at(11, 0))), "toDateTime64('2024-03-01 11:00:00', 6)");
    assert_eq!(e.value_literal(&Value::Int64(-4)), "-4");
}

#[test]
fn test_type_mapping() {
    let e = engine();
    assert_eq!(e.type_mapping("bool", None).unwrap(), "Bool");
    assert_eq!(e.type_mapping("string", Some(20)).unwrap(), "String");
    assert_eq!(e.type_mapping("date", None).unwrap(), "Date32");
    assert_eq!(e.type_mapping("datetimetz", None).unwrap(), "DateTime64(6, 'UTC')");
    assert_eq!(e.type_mapping("decimal", None).unwrap(), "Decimal(38, 10)");
    assert!(e.type_mapping("point", None).is_err());
}

#[test]
fn test_nullable_wraps_non_key_columns() {
    let e = engine();
    let column = DataColumn::new("status", ColumnType::String);
    assert_eq!(e.column_definition(&column, false).unwrap(), "`status` Nullable(String)");
    assert_eq!(e.column_definition(&column, true).unwrap(), "`status` String");
}

#[test]
fn test_select_sql() {
    let extraction = orders_extraction(DialectKind::ClickHouse);
    let request = SelectRequest::new(0, 1000, at(12, 0)).partitioned(true);
    assert_eq!(
        select_sql(&engine(), &extraction, &request).unwrap(),
        "SELECT src.* FROM `dbo`.`orders` src WHERE `updated_at` >= toDateTime('2024-03-01 11:00:00') \
         ORDER BY `id` DESC LIMIT 1000 OFFSET 0"
    );
}

#[test]
fn test_create_table_sql() {
    assert_eq!(
        engine()
            .create_table_sql(&orders_table(), &orders_extraction(DialectKind::ClickHouse))
            .unwrap(),
        "CREATE TABLE IF NOT EXISTS `sales`.`orders` (`id` Int64, `status` Nullable(String), \
         `updated_at` Nullable(DateTime64(6)), `ferry_updated_at` DateTime64(6) DEFAULT now64(6), \
         `ferry_row_id` UUID DEFAULT generateUUIDv4()) ENGINE = ReplacingMergeTree(`ferry_updated_at`) ORDER BY (`id`)"
    );
}

#[test]
fn test_probes() {
    let e = engine();
    assert_eq!(
        e.exists_sql("sales", "orders"),
        "SELECT 1 FROM system.tables WHERE database = 'sales' AND name = 'orders'"
    );
    assert_eq!(e.count_sql("`sales`.`orders`"), "SELECT count() AS row_count FROM `sales`.`orders` FINAL");
}

#[test]
fn test_merge_replaces_staged_keys_instead_of_updating() {
    let e = engine();
    let plan = MergePlan::new(
        &e,
        &orders_table(),
        &orders_extraction(DialectKind::ClickHouse),
        "`sales`.`stage`".to_string(),
        at(12, 30),
    );

    assert_eq!(e.update_sql(&plan), None);
    assert_eq!(
        e.create_staging_sql(&plan),
        "CREATE TABLE `sales`.`stage` ENGINE = Memory AS SELECT `id`, `status`, `updated_at` FROM `sales`.`orders` WHERE 0"
    );
    assert_eq!(
        e.insert_sql(&plan),
        "INSERT INTO `sales`.`orders` (`id`, `status`, `updated_at`, `ferry_updated_at`) \
         SELECT `id`, `status`, `updated_at`, toDateTime64('2024-03-01 12:30:00', 6) FROM `sales`.`stage`"
    );
    assert_eq!(
        e.delete_staged_sql(&plan).unwrap(),
        "DELETE FROM `sales`.`orders` WHERE `id` IN (SELECT `id` FROM `sales`.`stage`)"
    );
}

#[test]
fn test_staged_virtual_keys_delete_as_tuple() {
    let e = engine();
    let extraction = Extraction::new(5, "orders", "id").virtual_member("region", "us", true);
    let mut table = orders_table();
    table.add_constant_column(DataColumn::new("region", ColumnType::String), Value::String("us".into()));
    let plan = MergePlan::new(&e, &table, &extraction, "`stage`".to_string(), at(12, 30));

    assert_eq!(
        e.delete_staged_sql(&plan).unwrap(),
        "DELETE FROM `public`.`orders` WHERE (`id`, `region`) IN (SELECT `id`, `region` FROM `stage`)"
    );
}

#[test]
fn test_stale_delete_is_lightweight_delete() {
    let e = engine();
    assert_eq!(
        e.delete_stale_sql("`sales`.`orders`", &["`updated_at` >= toDateTime('2024-03-01 11:00:00')".to_string()]),
        "DELETE FROM `sales`.`orders` WHERE `updated_at` >= toDateTime('2024-03-01 11:00:00')"
    );
}
