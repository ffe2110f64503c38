//! PostgreSQL engine

use ferry_core::{DataTable, DialectKind, Extraction, Result};

use crate::dialect::{self, DialectSql, ExchangeDialect, ExchangeOptions};
use crate::merge::MergePlan;
use crate::sql::{ROW_ID_COLUMN, UPDATED_AT_COLUMN};

/// Longest `VARCHAR(n)` PostgreSQL accepts
const MAX_VARCHAR: i64 = 10_485_760;

#[derive(Debug, Clone, Default)]
pub struct PostgresExchange {
    options: ExchangeOptions,
}

impl PostgresExchange {
    pub fn new(options: ExchangeOptions) -> Self {
        Self { options }
    }
}

impl DialectSql for PostgresExchange {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    // Kept as OR: a virtual dependency's rows always match their own id, so
    // its fetch is effectively unpartitioned. Other engines use AND.
    fn virtual_combinator(&self) -> &'static str {
        "OR"
    }

    fn type_mapping(&self, native_type: &str, length: Option<i64>) -> Result<String> {
        let mapped = match native_type.to_ascii_lowercase().as_str() {
            "bool" => "BOOLEAN".to_string(),
            "int8" | "int16" => "SMALLINT".to_string(),
            "int32" => "INTEGER".to_string(),
            "int64" => "BIGINT".to_string(),
            "float32" => "REAL".to_string(),
            "float64" => "DOUBLE PRECISION".to_string(),
            "decimal" => "NUMERIC".to_string(),
            "string" => match length {
                Some(n) if (1..=MAX_VARCHAR).contains(&n) => format!("VARCHAR({})", n),
                _ => "TEXT".to_string(),
            },
            "bytes" => "BYTEA".to_string(),
            "uuid" => "UUID".to_string(),
            "date" => "DATE".to_string(),
            "time" => "TIME".to_string(),
            "datetime" => "TIMESTAMP".to_string(),
            "datetimetz" => "TIMESTAMPTZ".to_string(),
            "json" | "array" => "JSONB".to_string(),
            _ => return Err(dialect::unsupported(self.kind(), native_type)),
        };
        Ok(mapped)
    }

    fn create_schema_sql(&self, schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote_identifier(schema))
    }

    fn create_table_sql(&self, table: &DataTable, extraction: &Extraction) -> Result<String> {
        let (columns, keys) = dialect::table_columns(self, table, extraction)?;
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, {} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, {} BIGSERIAL, UNIQUE ({}))",
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

    fn create_staging_sql(&self, plan: &MergePlan) -> String {
        format!(
            "CREATE TEMP TABLE {} AS SELECT {} FROM {} WITH NO DATA",
            plan.stage,
            crate::sql::column_list(&plan.columns, |c| self.quote_identifier(c)),
            plan.target
        )
    }

    fn update_sql(&self, plan: &MergePlan) -> Option<String> {
        // SET targets cannot carry the table alias
        let assignments = plan
            .non_key_columns()
            .into_iter()
            .map(|c| {
                let c = self.quote_identifier(c);
                format!("{c} = s.{c}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "UPDATE {} d SET {}, {} = {} FROM {} s WHERE {}",
            plan.target,
            assignments,
            self.quote_identifier(UPDATED_AT_COLUMN),
            plan.updated_at,
            plan.stage,
            plan.key_join(self, "d", "s")
        ))
    }
}

impl ExchangeDialect for PostgresExchange {}

#[cfg(test)]
mod tests;
