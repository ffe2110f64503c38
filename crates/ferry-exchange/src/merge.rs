//! Bulk and merge loading into destination tables

use chrono::{NaiveDateTime, Utc};
use ferry_core::{Connection, DataTable, Extraction, FerryError, Result, Value};

use crate::dialect::{DialectSql, ExchangeDialect};
use crate::sql::{self, UPDATED_AT_COLUMN};

/// Names shared by the statements of one merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Quoted, qualified destination table
    pub target: String,
    /// Quoted staging table
    pub stage: String,
    /// Buffer columns, unquoted, in buffer order
    pub columns: Vec<String>,
    /// Index column, then the virtual group column when present
    pub keys: Vec<String>,
    /// Literal written to the change-tracking column
    pub updated_at: String,
}

impl MergePlan {
    pub fn new<D: DialectSql + ?Sized>(
        dialect: &D,
        table: &DataTable,
        extraction: &Extraction,
        stage: String,
        now: NaiveDateTime,
    ) -> Self {
        let mut keys = vec![extraction.index_column.clone()];
        if let Some(group) = extraction.virtual_column() {
            keys.push(group.to_string());
        }
        Self {
            target: dialect.qualified_table(&extraction.destination_schema(), extraction.table_alias()),
            stage,
            columns: table.column_names(),
            keys,
            updated_at: dialect.value_literal(&Value::DateTime(now)),
        }
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.keys.iter().any(|k| k.eq_ignore_ascii_case(column))
    }

    pub fn non_key_columns(&self) -> Vec<&String> {
        self.columns.iter().filter(|c| !self.is_key(c)).collect()
    }

    /// `left.k = right.k AND ...` over the key columns
    pub fn key_join<D: DialectSql + ?Sized>(&self, dialect: &D, left: &str, right: &str) -> String {
        self.keys
            .iter()
            .map(|key| {
                let key = dialect.quote_identifier(key);
                format!("{left}.{key} = {right}.{key}")
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// `d.c = s.c, ...` over the non-key columns
    pub fn assignments<D: DialectSql + ?Sized>(&self, dialect: &D, left: &str, right: &str) -> String {
        self.non_key_columns()
            .into_iter()
            .map(|column| {
                let column = dialect.quote_identifier(column);
                format!("{left}.{column} = {right}.{column}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn with_updated_at(table: &DataTable, now: NaiveDateTime) -> (Vec<String>, Vec<Vec<Value>>) {
    let mut columns = table.column_names();
    columns.push(UPDATED_AT_COLUMN.to_string());
    let stamp = Value::DateTime(now);
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.push(stamp.clone());
            row
        })
        .collect();
    (columns, rows)
}

async fn bulk_insert(
    conn: &dyn Connection,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
    timeout: std::time::Duration,
) -> Result<u64> {
    tokio::time::timeout(timeout, conn.bulk_insert(table, columns, rows))
        .await
        .map_err(|_| FerryError::Timeout(format!("bulk load into {} exceeded {}s", table, timeout.as_secs())))?
}

pub(crate) async fn bulk_load<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    table: &DataTable,
    extraction: &Extraction,
    conn: &dyn Connection,
) -> Result<u64> {
    if table.is_empty() {
        return Ok(0);
    }
    let target = dialect.qualified_table(&extraction.destination_schema(), extraction.table_alias());
    let (columns, rows) = with_updated_at(table, Utc::now().naive_utc());

    let written = bulk_insert(conn, &target, &columns, &rows, dialect.options().command_timeout).await?;
    tracing::debug!(dialect = %dialect.kind(), table = %target, rows = written, "bulk load complete");
    Ok(written)
}

pub(crate) async fn merge_load<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    table: &DataTable,
    extraction: &Extraction,
    loaded_at: NaiveDateTime,
    conn: &dyn Connection,
) -> Result<u64> {
    if table.is_empty() {
        return Ok(0);
    }
    let timeout = dialect.options().command_timeout;
    let plan = MergePlan::new(dialect, table, extraction, dialect.staging_table(extraction), loaded_at);

    sql::execute(conn, &dialect.create_staging_sql(&plan), timeout).await?;
    let outcome = apply_merge(dialect, &plan, table, conn).await;

    // The staging table goes even when the merge failed.
    if let Err(e) = sql::execute(conn, &dialect.drop_staging_sql(&plan), timeout).await {
        tracing::warn!(stage = %plan.stage, error = %e, "failed to drop staging table");
    }
    outcome
}

async fn apply_merge<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    plan: &MergePlan,
    table: &DataTable,
    conn: &dyn Connection,
) -> Result<u64> {
    let timeout = dialect.options().command_timeout;
    let staged = bulk_insert(conn, &plan.stage, &plan.columns, &table.rows, timeout).await?;

    let replaced = match dialect.delete_staged_sql(plan) {
        Some(delete) => sql::execute(conn, &delete, timeout).await?.affected_rows,
        None => 0,
    };
    let updated = match dialect.update_sql(plan) {
        Some(update) if !plan.non_key_columns().is_empty() => {
            sql::execute(conn, &update, timeout).await?.affected_rows
        }
        _ => 0,
    };
    let inserted = sql::execute(conn, &dialect.insert_sql(plan), timeout)
        .await?
        .affected_rows;

    tracing::debug!(
        dialect = %dialect.kind(),
        table = %plan.target,
        staged,
        replaced,
        updated,
        inserted,
        "merge load complete"
    );
    Ok(staged)
}

/// Window, stamp and virtual-id predicates of the stale-row delete
pub(crate) fn stale_predicates<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    extraction: &Extraction,
    request_time: NaiveDateTime,
    loaded_at: NaiveDateTime,
    virtual_ids: &[Value],
) -> Result<Vec<String>> {
    let mut predicates = vec![
        dialect.partition_condition(extraction, request_time, None, None)?,
        format!(
            "{} < {}",
            dialect.quote_identifier(UPDATED_AT_COLUMN),
            dialect.value_literal(&Value::DateTime(loaded_at))
        ),
    ];
    if let Some(group) = extraction.virtual_column() {
        let ids: Vec<String> = virtual_ids.iter().map(|v| dialect.value_literal(v)).collect();
        predicates.push(format!(
            "{} IN ({})",
            dialect.quote_identifier(group),
            ids.join(", ")
        ));
    }
    Ok(predicates)
}

pub(crate) async fn delete_stale<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    extraction: &Extraction,
    request_time: NaiveDateTime,
    loaded_at: NaiveDateTime,
    virtual_ids: &[Value],
    conn: &dyn Connection,
) -> Result<u64> {
    // A virtual table with no merged group has nothing it may delete
    if extraction.virtual_column().is_some() && virtual_ids.is_empty() {
        return Ok(0);
    }
    let target = dialect.qualified_table(&extraction.destination_schema(), extraction.table_alias());
    let predicates = stale_predicates(dialect, extraction, request_time, loaded_at, virtual_ids)?;
    let deleted = sql::execute(
        conn,
        &dialect.delete_stale_sql(&target, &predicates),
        dialect.options().command_timeout,
    )
    .await?
    .affected_rows;

    tracing::info!(dialect = %dialect.kind(), table = %target, deleted, "stale rows deleted");
    Ok(deleted)
}
