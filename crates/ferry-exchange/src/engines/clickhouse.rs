//! ClickHouse engine
//!
//! ClickHouse has no row-level UPDATE worth using per page. Destination tables
//! are `ReplacingMergeTree` versioned by the change-tracking column, so a
//! merge re-inserts every staged row and the newest version wins on merge.

use chrono::NaiveDateTime;
use ferry_core::{DataColumn, DataTable, DialectKind, Extraction, Result, Value};

use crate::dialect::{self, DialectSql, ExchangeDialect, ExchangeOptions, short_id};
use crate::merge::MergePlan;
use crate::sql::{self, ROW_ID_COLUMN, TIMESTAMP_FORMAT, TIMESTAMP_FRACTION_FORMAT, UPDATED_AT_COLUMN};

#[derive(Debug, Clone, Default)]
pub struct ClickHouseExchange {
    options: ExchangeOptions,
}

impl ClickHouseExchange {
    pub fn new(options: ExchangeOptions) -> Self {
        Self { options }
    }
}

impl DialectSql for ClickHouseExchange {
    fn kind(&self) -> DialectKind {
        DialectKind::ClickHouse
    }

    fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "\\`"))
    }

    fn quote_string(&self, value: &str) -> String {
        sql::backslash_string_literal(value)
    }

    fn timestamp_literal(&self, timestamp: NaiveDateTime) -> String {
        format!("toDateTime('{}')", timestamp.format(TIMESTAMP_FORMAT))
    }

    fn value_literal(&self, value: &Value) -> String {
        match value {
            Value::DateTime(v) => format!("toDateTime64('{}', 6)", v.format(TIMESTAMP_FRACTION_FORMAT)),
            other => dialect::standard_value_literal(self, other),
        }
    }

    fn type_mapping(&self, native_type: &str, length: Option<i64>) -> Result<String> {
        let _ = length;
        let mapped = match native_type.to_ascii_lowercase().as_str() {
            "bool" => "Bool",
            "int8" => "Int8",
            "int16" => "Int16",
            "int32" => "Int32",
            "int64" => "Int64",
            "float32" => "Float32",
            "float64" => "Float64",
            "decimal" => "Decimal(38, 10)",
            "string" | "bytes" => "String",
            "uuid" => "UUID",
            "date" => "Date32",
            "time" => "String",
            "datetime" => "DateTime64(6)",
            "datetimetz" => "DateTime64(6, 'UTC')",
            "json" | "array" => "String",
            _ => return Err(dialect::unsupported(self.kind(), native_type)),
        };
        Ok(mapped.to_string())
    }

    // Sorting keys cannot be Nullable
    fn column_definition(&self, column: &DataColumn, is_key: bool) -> Result<String> {
        let ty = self.type_mapping(column.column_type.as_str(), column.max_length)?;
        let ty = if column.nullable && !is_key {
            format!("Nullable({})", ty)
        } else {
            ty
        };
        Ok(format!("{} {}", self.quote_identifier(&column.name), ty))
    }

    fn create_schema_sql(&self, schema: &str) -> String {
        format!("CREATE DATABASE IF NOT EXISTS {}", self.quote_identifier(schema))
    }

    fn create_table_sql(&self, table: &DataTable, extraction: &Extraction) -> Result<String> {
        let (columns, keys) = dialect::table_columns(self, table, extraction)?;
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, {updated} DateTime64(6) DEFAULT now64(6), \
             {} UUID DEFAULT generateUUIDv4()) ENGINE = ReplacingMergeTree({updated}) ORDER BY ({})",
            self.qualified_table(&extraction.destination_schema(), extraction.table_alias()),
            columns.join(", "),
            self.quote_identifier(ROW_ID_COLUMN),
            keys,
            updated = self.quote_identifier(UPDATED_AT_COLUMN),
        ))
    }

    fn exists_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT 1 FROM system.tables WHERE database = {} AND name = {}",
            self.quote_string(schema),
            self.quote_string(table)
        )
    }

    /// Collapses row versions a background merge has not yet replaced
    fn count_sql(&self, table: &str) -> String {
        format!("SELECT count() AS row_count FROM {} FINAL", table)
    }

    // HTTP requests carry no session, so the stage is a real Memory table
    fn staging_table(&self, extraction: &Extraction) -> String {
        self.qualified_table(
            &extraction.destination_schema(),
            &format!("ferry_stage_{}", short_id()),
        )
    }

    fn create_staging_sql(&self, plan: &MergePlan) -> String {
        format!(
            "CREATE TABLE {} ENGINE = Memory AS SELECT {} FROM {} WHERE 0",
            plan.stage,
            sql::column_list(&plan.columns, |c| self.quote_identifier(c)),
            plan.target
        )
    }

    fn update_sql(&self, plan: &MergePlan) -> Option<String> {
        let _ = plan;
        None
    }

    fn insert_sql(&self, plan: &MergePlan) -> String {
        let columns = sql::column_list(&plan.columns, |c| self.quote_identifier(c));
        format!(
            "INSERT INTO {} ({}, {}) SELECT {}, {} FROM {}",
            plan.target,
            columns,
            self.quote_identifier(UPDATED_AT_COLUMN),
            columns,
            plan.updated_at,
            plan.stage
        )
    }

    /// Rows are re-inserted rather than updated, so staged keys are
    /// removed first
    fn delete_staged_sql(&self, plan: &MergePlan) -> Option<String> {
        let keys = sql::column_list(&plan.keys, |c| self.quote_identifier(c));
        let tuple = if plan.keys.len() > 1 {
            format!("({})", keys)
        } else {
            keys.clone()
        };
        Some(format!(
            "DELETE FROM {} WHERE {} IN (SELECT {} FROM {})",
            plan.target, tuple, keys, plan.stage
        ))
    }
}

impl ExchangeDialect for ClickHouseExchange {}

#[cfg(test)]
mod tests;
