//! MySQL engine

use ferry_core::{DataColumn, DataTable, DialectKind, Extraction, Result};

use crate::dialect::{self, DialectSql, ExchangeDialect, ExchangeOptions, short_id};
use crate::merge::MergePlan;
use crate::sql::{self, ROW_ID_COLUMN, UPDATED_AT_COLUMN};

/// Longest `VARCHAR(n)` that still fits a utf8mb4 row
const MAX_VARCHAR: i64 = 16_383;

/// Longest string a unique key may cover (3072 bytes of utf8mb4)
const MAX_KEY_CHARS: i64 = 768;

#[derive(Debug, Clone, Default)]
pub struct MySqlExchange {
    options: ExchangeOptions,
}

impl MySqlExchange {
    pub fn new(options: ExchangeOptions) -> Self {
        Self { options }
    }
}

impl DialectSql for MySqlExchange {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn quote_string(&self, value: &str) -> String {
        sql::backslash_string_literal(value)
    }

    fn type_mapping(&self, native_type: &str, length: Option<i64>) -> Result<String> {
        let mapped = match native_type.to_ascii_lowercase().as_str() {
            "bool" => "BOOLEAN".to_string(),
            "int8" => "TINYINT".to_string(),
            "int16" => "SMALLINT".to_string(),
            "int32" => "INT".to_string(),
            "int64" => "BIGINT".to_string(),
            "float32" => "FLOAT".to_string(),
            "float64" => "DOUBLE".to_string(),
            "decimal" => "DECIMAL(38, 10)".to_string(),
            "string" => match length {
                Some(n) if (1..=MAX_VARCHAR).contains(&n) => format!("VARCHAR({})", n),
                _ => "LONGTEXT".to_string(),
            },
            "bytes" => "LONGBLOB".to_string(),
            "uuid" => "CHAR(36)".to_string(),
            "date" => "DATE".to_string(),
            "time" => "TIME(6)".to_string(),
            "datetime" | "datetimetz" => "DATETIME(6)".to_string(),
            "json" | "array" => "JSON".to_string(),
            _ => return Err(dialect::unsupported(self.kind(), native_type)),
        };
        Ok(mapped)
    }

    fn column_definition(&self, column: &DataColumn, is_key: bool) -> Result<String> {
        let ty = match (is_key, column.column_type.as_str(), column.max_length) {
            (true, "string", Some(n)) if (1..=MAX_KEY_CHARS).contains(&n) => format!("VARCHAR({})", n),
            (true, "string", _) => "VARCHAR(255)".to_string(),
            _ => self.type_mapping(column.column_type.as_str(), column.max_length)?,
        };
        let null = if column.nullable && !is_key { "NULL" } else { "NOT NULL" };
        Ok(format!("{} {} {}", self.quote_identifier(&column.name), ty, null))
    }

    fn create_schema_sql(&self, schema: &str) -> String {
        format!("CREATE DATABASE IF NOT EXISTS {}", self.quote_identifier(schema))
    }

    fn create_table_sql(&self, table: &DataTable, extraction: &Extraction) -> Result<String> {
        let (columns, keys) = dialect::table_columns(self, table, extraction)?;
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, {} DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6), \
             {} BIGINT NOT NULL AUTO_INCREMENT UNIQUE KEY, UNIQUE KEY ({}))",
            self.qualified_table(&extraction.destination_schema(), extraction.table_alias()),
            columns.join(", "),
            self.quote_identifier(UPDATED_AT_COLUMN),
            self.quote_identifier(ROW_ID_COLUMN),
            keys
        ))
    }

    fn exists_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = {}",
            self.quote_string(schema),
            self.quote_string(table)
        )
    }

    // Qualified so the merge works on connections without a default database
    fn staging_table(&self, extraction: &Extraction) -> String {
        self.qualified_table(
            &extraction.destination_schema(),
            &format!("ferry_stage_{}", short_id()),
        )
    }

    fn create_staging_sql(&self, plan: &MergePlan) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} AS SELECT {} FROM {} LIMIT 0",
            plan.stage,
            sql::column_list(&plan.columns, |c| self.quote_identifier(c)),
            plan.target
        )
    }

    fn drop_staging_sql(&self, plan: &MergePlan) -> String {
        format!("DROP TEMPORARY TABLE IF EXISTS {}", plan.stage)
    }

    fn update_sql(&self, plan: &MergePlan) -> Option<String> {
        Some(format!(
            "UPDATE {} d INNER JOIN {} s ON {} SET {}, d.{} = {}",
            plan.target,
            plan.stage,
            plan.key_join(self, "d", "s"),
            plan.assignments(self, "d", "s"),
            self.quote_identifier(UPDATED_AT_COLUMN),
            plan.updated_at
        ))
    }

    // Anti-join: MySQL may read the target in FROM, not in a subquery
    fn insert_sql(&self, plan: &MergePlan) -> String {
        let selected = plan
            .columns
            .iter()
            .map(|c| format!("s.{}", self.quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {target} ({columns}, {updated}) SELECT {selected}, {now} FROM {stage} s \
             LEFT JOIN {target} d ON {join} WHERE d.{index} IS NULL",
            target = plan.target,
            columns = sql::column_list(&plan.columns, |c| self.quote_identifier(c)),
            updated = self.quote_identifier(UPDATED_AT_COLUMN),
            selected = selected,
            now = plan.updated_at,
            stage = plan.stage,
            join = plan.key_join(self, "d", "s"),
            index = self.quote_identifier(ROW_ID_COLUMN),
        )
    }
}

impl ExchangeDialect for MySqlExchange {}
