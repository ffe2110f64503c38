//! SQL Server engine

use chrono::NaiveDateTime;
use ferry_core::{DataColumn, DataTable, DialectKind, Extraction, Result, Value};

use crate::dialect::{self, DialectSql, ExchangeDialect, ExchangeOptions, short_id};
use crate::merge::MergePlan;
use crate::sql::{self, ROW_ID_COLUMN, TIMESTAMP_FORMAT, TIMESTAMP_FRACTION_FORMAT, UPDATED_AT_COLUMN};

/// Longest bounded `NVARCHAR(n)`
const MAX_NVARCHAR: i64 = 4_000;

/// Longest string a unique constraint may cover (900 bytes)
const MAX_KEY_CHARS: i64 = 450;

#[derive(Debug, Clone, Default)]
pub struct SqlServerExchange {
    options: ExchangeOptions,
}

impl SqlServerExchange {
    pub fn new(options: ExchangeOptions) -> Self {
        Self { options }
    }
}

impl DialectSql for SqlServerExchange {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    fn quote_string(&self, value: &str) -> String {
        format!("N{}", sql::standard_string_literal(value))
    }

    fn pagination(&self, offset: u64, limit: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn non_locking_hint(&self) -> &'static str {
        "WITH (NOLOCK)"
    }

    fn timestamp_literal(&self, timestamp: NaiveDateTime) -> String {
        format!("CAST('{}' AS DATETIME2)", timestamp.format(TIMESTAMP_FORMAT))
    }

    fn value_literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Value::DateTime(v) => format!("CAST('{}' AS DATETIME2)", v.format(TIMESTAMP_FRACTION_FORMAT)),
            other => dialect::standard_value_literal(self, other),
        }
    }

    fn type_mapping(&self, native_type: &str, length: Option<i64>) -> Result<String> {
        let mapped = match native_type.to_ascii_lowercase().as_str() {
            "bool" => "BIT".to_string(),
            // TINYINT is unsigned
            "int8" | "int16" => "SMALLINT".to_string(),
            "int32" => "INT".to_string(),
            "int64" => "BIGINT".to_string(),
            "float32" => "REAL".to_string(),
            "float64" => "FLOAT".to_string(),
            "decimal" => "DECIMAL(38, 10)".to_string(),
            "string" => match length {
                Some(n) if (1..=MAX_NVARCHAR).contains(&n) => format!("NVARCHAR({})", n),
                _ => "NVARCHAR(MAX)".to_string(),
            },
            "bytes" => "VARBINARY(MAX)".to_string(),
            "uuid" => "UNIQUEIDENTIFIER".to_string(),
            "date" => "DATE".to_string(),
            "time" => "TIME(7)".to_string(),
            "datetime" => "DATETIME2(7)".to_string(),
            "datetimetz" => "DATETIMEOFFSET(7)".to_string(),
            "json" | "array" => "NVARCHAR(MAX)".to_string(),
            _ => return Err(dialect::unsupported(self.kind(), native_type)),
        };
        Ok(mapped)
    }

    fn column_definition(&self, column: &DataColumn, is_key: bool) -> Result<String> {
        let ty = match (is_key, column.column_type.as_str(), column.max_length) {
            (true, "string", Some(n)) if (1..=MAX_KEY_CHARS).contains(&n) => format!("NVARCHAR({})", n),
            (true, "string", _) => format!("NVARCHAR({})", MAX_KEY_CHARS),
            _ => self.type_mapping(column.column_type.as_str(), column.max_length)?,
        };
        let null = if column.nullable && !is_key { "NULL" } else { "NOT NULL" };
        Ok(format!("{} {} {}", self.quote_identifier(&column.name), ty, null))
    }

    fn create_schema_sql(&self, schema: &str) -> String {
        format!(
            "IF SCHEMA_ID({}) IS NULL EXEC({})",
            self.quote_string(schema),
            self.quote_string(&format!("CREATE SCHEMA {}", self.quote_identifier(schema)))
        )
    }

    fn create_table_sql(&self, table: &DataTable, extraction: &Extraction) -> Result<String> {
        let (columns, keys) = dialect::table_columns(self, table, extraction)?;
        let schema = extraction.destination_schema();
        let target = self.qualified_table(&schema, extraction.table_alias());
        let constraint = format!("UQ_{}_{}", schema, extraction.table_alias());
        Ok(format!(
            "IF OBJECT_ID({}, N'U') IS NULL CREATE TABLE {} ({}, {} DATETIME2(7) NOT NULL DEFAULT SYSUTCDATETIME(), \
             {} BIGINT IDENTITY(1,1) NOT NULL, CONSTRAINT {} UNIQUE ({}))",
            self.quote_string(&target),
            target,
            columns.join(", "),
            self.quote_identifier(UPDATED_AT_COLUMN),
            self.quote_identifier(ROW_ID_COLUMN),
            self.quote_identifier(&constraint),
            keys
        ))
    }

    fn exists_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT 1 AS present WHERE OBJECT_ID({}, N'U') IS NOT NULL",
            self.quote_string(&self.qualified_table(schema, table))
        )
    }

    fn count_sql(&self, table: &str) -> String {
        format!("SELECT COUNT_BIG(*) AS row_count FROM {}", table)
    }

    // Statements run through sp_executesql, which drops local #temp tables
    // when it returns; a global ## table lives until the session ends.
    fn staging_table(&self, extraction: &Extraction) -> String {
        let _ = extraction;
        self.quote_identifier(&format!("##ferry_stage_{}", short_id()))
    }

    fn create_staging_sql(&self, plan: &MergePlan) -> String {
        format!(
            "SELECT TOP 0 {} INTO {} FROM {}",
            sql::column_list(&plan.columns, |c| self.quote_identifier(c)),
            plan.stage,
            plan.target
        )
    }

    fn update_sql(&self, plan: &MergePlan) -> Option<String> {
        Some(format!(
            "UPDATE d SET {}, d.{} = {} FROM {} d INNER JOIN {} s ON {}",
            plan.assignments(self, "d", "s"),
            self.quote_identifier(UPDATED_AT_COLUMN),
            plan.updated_at,
            plan.target,
            plan.stage,
            plan.key_join(self, "d", "s")
        ))
    }
}

impl ExchangeDialect for SqlServerExchange {}

#[cfg(test)]
mod tests;
