//! SQL text and execution helpers shared by every engine

use std::time::Duration;

use ferry_core::{Connection, FerryError, QueryResult, Result, StatementResult};

/// Change-tracking column added to every destination table
pub const UPDATED_AT_COLUMN: &str = "ferry_updated_at";

/// Surrogate identity column added to every destination table
pub const ROW_ID_COLUMN: &str = "ferry_row_id";

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const TIMESTAMP_FRACTION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// `'it''s'`
pub(crate) fn standard_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `'it\'s'`, for engines that treat backslash as an escape
pub(crate) fn backslash_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Quote each dot-separated part of a possibly qualified name
pub(crate) fn quote_path(name: &str, quote: impl Fn(&str) -> String) -> String {
    name.split('.')
        .map(|part| quote(part.trim()))
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) fn column_list(columns: &[String], quote: impl Fn(&str) -> String) -> String {
    columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

/// Run a statement bounded by the engine's command timeout
pub(crate) async fn execute(
    conn: &dyn Connection,
    sql: &str,
    timeout: Duration,
) -> Result<StatementResult> {
    tracing::trace!(sql = %preview(sql), "execute");
    tokio::time::timeout(timeout, conn.execute(sql, &[]))
        .await
        .map_err(|_| {
            FerryError::Timeout(format!(
                "statement exceeded {}s: {}",
                timeout.as_secs(),
                preview(sql)
            ))
        })?
}

/// Run a query bounded by the engine's command timeout
pub(crate) async fn query(conn: &dyn Connection, sql: &str, timeout: Duration) -> Result<QueryResult> {
    tracing::trace!(sql = %preview(sql), "query");
    tokio::time::timeout(timeout, conn.query(sql, &[]))
        .await
        .map_err(|_| {
            FerryError::Timeout(format!(
                "query exceeded {}s: {}",
                timeout.as_secs(),
                preview(sql)
            ))
        })?
}
