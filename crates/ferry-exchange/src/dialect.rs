//! Capability traits implemented by every engine

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use ferry_core::{
    Connection, DataColumn, DataTable, DialectKind, Extraction, FerryError, Result, Value,
};
use tokio_util::sync::CancellationToken;

use crate::merge::{self, MergePlan};
use crate::select;
use crate::sql::{self, TIMESTAMP_FORMAT, TIMESTAMP_FRACTION_FORMAT, UPDATED_AT_COLUMN};
use crate::virtual_table;

/// Per-engine execution settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Upper bound on any single statement or probe
    pub command_timeout: Duration,
}

impl ExchangeOptions {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(300),
        }
    }
}

/// One page request against a source table
#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub offset: u64,
    pub limit: u64,
    /// Reference time the incremental window is measured back from
    pub request_time: NaiveDateTime,
    /// Restrict the fetch to the incremental window
    pub should_partition: bool,
    /// Replaces the extraction's own window width, in seconds
    pub override_filter_secs: Option<i64>,
}

impl SelectRequest {
    pub fn new(offset: u64, limit: u64, request_time: NaiveDateTime) -> Self {
        Self {
            offset,
            limit,
            request_time,
            should_partition: false,
            override_filter_secs: None,
        }
    }

    pub fn partitioned(mut self, should_partition: bool) -> Self {
        self.should_partition = should_partition;
        self
    }

    pub fn with_override_filter_secs(mut self, secs: i64) -> Self {
        self.override_filter_secs = Some(secs);
        self
    }

    /// Same window, next page
    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            ..self.clone()
        }
    }
}

/// Fetches one dependency of a virtual table.
///
/// Dependencies can live on different origins, so the caller supplies the
/// connection and engine for each one.
#[async_trait]
pub trait DependencyFetcher: Send + Sync {
    async fn fetch(&self, dependency: &Extraction) -> Result<DataTable>;
}

/// SQL surface of one database engine
///
/// Everything here is pure text generation. Engines override what their
/// dialect spells differently; the defaults follow standard SQL.
pub trait DialectSql: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn options(&self) -> &ExchangeOptions;

    fn quote_identifier(&self, identifier: &str) -> String;

    fn quote_string(&self, value: &str) -> String {
        sql::standard_string_literal(value)
    }

    fn qualified_table(&self, schema: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(schema),
            self.quote_identifier(table)
        )
    }

    /// Source object name, quoted part by part (`sales.orders`)
    fn source_table(&self, name: &str) -> String {
        sql::quote_path(name, |part| self.quote_identifier(part))
    }

    fn pagination(&self, offset: u64, limit: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    fn non_locking_hint(&self) -> &'static str {
        ""
    }

    fn timestamp_literal(&self, timestamp: NaiveDateTime) -> String {
        self.quote_string(&timestamp.format(TIMESTAMP_FORMAT).to_string())
    }

    fn value_literal(&self, value: &Value) -> String {
        standard_value_literal(self, value)
    }

    /// Joins the virtual-id predicate to the time predicate
    fn virtual_combinator(&self) -> &'static str {
        "AND"
    }

    /// Destination column type for a canonical type name.
    ///
    /// Fails with `UnsupportedType` for names outside the mapping table.
    fn type_mapping(&self, native_type: &str, length: Option<i64>) -> Result<String>;

    /// Column definition inside `CREATE TABLE`; key columns may need a bounded type
    fn column_definition(&self, column: &DataColumn, is_key: bool) -> Result<String> {
        let ty = self.type_mapping(column.column_type.as_str(), column.max_length)?;
        let null = if column.nullable && !is_key { "NULL" } else { "NOT NULL" };
        Ok(format!("{} {} {}", self.quote_identifier(&column.name), ty, null))
    }

    /// Idempotent DDL creating the destination schema (or database)
    fn create_schema_sql(&self, schema: &str) -> String;

    /// Idempotent DDL creating the destination table for `table`'s columns
    fn create_table_sql(&self, table: &DataTable, extraction: &Extraction) -> Result<String>;

    /// Returns a row when the table exists
    fn exists_sql(&self, schema: &str, table: &str) -> String;

    fn count_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) AS row_count FROM {}", table)
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", table)
    }

    /// Session-scoped staging table name for one merge
    fn staging_table(&self, extraction: &Extraction) -> String {
        let _ = extraction;
        self.quote_identifier(&format!("ferry_stage_{}", short_id()))
    }

    fn create_staging_sql(&self, plan: &MergePlan) -> String;

    fn drop_staging_sql(&self, plan: &MergePlan) -> String {
        format!("DROP TABLE IF EXISTS {}", plan.stage)
    }

    /// Refresh matching rows, or `None` when the engine versions rows instead
    fn update_sql(&self, plan: &MergePlan) -> Option<String>;

    fn insert_sql(&self, plan: &MergePlan) -> String {
        let columns = sql::column_list(&plan.columns, |c| self.quote_identifier(c));
        let selected = plan
            .columns
            .iter()
            .map(|c| format!("s.{}", self.quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {target} ({columns}, {updated}) SELECT {selected}, {now} FROM {stage} s \
             WHERE NOT EXISTS (SELECT 1 FROM {target} d WHERE {join})",
            target = plan.target,
            columns = columns,
            updated = self.quote_identifier(UPDATED_AT_COLUMN),
            selected = selected,
            now = plan.updated_at,
            stage = plan.stage,
            join = plan.key_join(self, "d", "s"),
        )
    }

    /// Clear staged keys from the target before the insert, for engines
    /// without an in-place update
    fn delete_staged_sql(&self, plan: &MergePlan) -> Option<String> {
        let _ = plan;
        None
    }

    fn delete_stale_sql(&self, target: &str, predicates: &[String]) -> String {
        format!("DELETE FROM {} WHERE {}", target, predicates.join(" AND "))
    }
}

/// Literal forms shared by most engines; strings go through the engine's quoting
pub(crate) fn standard_value_literal<D: DialectSql + ?Sized>(dialect: &D, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int8(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => value.to_string(),
        Value::Float32(v) if v.is_finite() => v.to_string(),
        Value::Float64(v) if v.is_finite() => v.to_string(),
        Value::Float32(_) | Value::Float64(_) => "NULL".to_string(),
        Value::Decimal(v) if v.parse::<f64>().is_ok() => v.clone(),
        Value::DateTime(v) => dialect.quote_string(&v.format(TIMESTAMP_FRACTION_FORMAT).to_string()),
        other => match other.to_json() {
            serde_json::Value::String(s) => dialect.quote_string(&s),
            json => dialect.quote_string(&json.to_string()),
        },
    }
}

pub(crate) fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

/// The operations a pipeline runs against an engine
///
/// Every operation is bounded by the engine's command timeout and returns
/// an explicit `Result`.
#[async_trait]
pub trait ExchangeDialect: DialectSql {
    /// `filter_column >= lookup_time`, where the lookup time is the request
    /// time shifted by the origin's timezone offset and moved back by the
    /// window width. For virtual dependencies the virtual-id predicate is
    /// joined with the engine's combinator.
    fn partition_condition(
        &self,
        extraction: &Extraction,
        request_time: NaiveDateTime,
        virtual_column: Option<&str>,
        override_filter_secs: Option<i64>,
    ) -> Result<String> {
        let column = extraction.filter_column.as_deref().ok_or_else(|| {
            FerryError::Configuration(format!(
                "extraction '{}' has no filter column",
                extraction.name
            ))
        })?;
        let window = override_filter_secs
            .or(extraction.filter_time_secs)
            .unwrap_or_default();
        let lookup = request_time + chrono::Duration::hours(extraction.timezone_offset_hours() as i64)
            - chrono::Duration::seconds(window);

        let time_predicate = format!(
            "{} >= {}",
            self.quote_identifier(column),
            self.timestamp_literal(lookup)
        );
        match (virtual_column, extraction.virtual_id.as_deref()) {
            (Some(group), Some(virtual_id)) => Ok(format!(
                "({} {} {} = {})",
                time_predicate,
                self.virtual_combinator(),
                self.quote_identifier(group),
                self.quote_string(virtual_id)
            )),
            _ => Ok(time_predicate),
        }
    }

    /// Create the destination schema and table; a no-op when both exist
    async fn create_table(
        &self,
        table: &DataTable,
        extraction: &Extraction,
        conn: &dyn Connection,
    ) -> Result<()> {
        let timeout = self.options().command_timeout;
        let schema = extraction.destination_schema();
        sql::execute(conn, &self.create_schema_sql(&schema), timeout).await?;
        sql::execute(conn, &self.create_table_sql(table, extraction)?, timeout).await?;
        tracing::debug!(
            dialect = %self.kind(),
            table = %self.qualified_table(&schema, extraction.table_alias()),
            "destination table ensured"
        );
        Ok(())
    }

    async fn exists(&self, extraction: &Extraction, conn: &dyn Connection) -> Result<bool> {
        let sql = self.exists_sql(&extraction.destination_schema(), extraction.table_alias());
        let result = sql::query(conn, &sql, self.options().command_timeout).await?;
        Ok(result.has_rows())
    }

    async fn count_rows(&self, extraction: &Extraction, conn: &dyn Connection) -> Result<u64> {
        let table = self.qualified_table(&extraction.destination_schema(), extraction.table_alias());
        let result = sql::query(conn, &self.count_sql(&table), self.options().command_timeout).await?;
        let count = result
            .scalar()
            .and_then(Value::as_i64)
            .ok_or_else(|| FerryError::Query(format!("row count of {} returned no number", table)))?;
        Ok(count.max(0) as u64)
    }

    async fn truncate(&self, extraction: &Extraction, conn: &dyn Connection) -> Result<()> {
        let table = self.qualified_table(&extraction.destination_schema(), extraction.table_alias());
        sql::execute(conn, &self.truncate_sql(&table), self.options().command_timeout).await?;
        tracing::info!(table = %table, "destination truncated");
        Ok(())
    }

    /// Load the whole buffer through the connection's native bulk path
    async fn bulk_load(
        &self,
        table: &DataTable,
        extraction: &Extraction,
        conn: &dyn Connection,
    ) -> Result<u64> {
        merge::bulk_load(self, table, extraction, conn).await
    }

    /// Upsert the buffer, stamping every staged row with `loaded_at`
    async fn merge_load(
        &self,
        table: &DataTable,
        extraction: &Extraction,
        loaded_at: NaiveDateTime,
        conn: &dyn Connection,
    ) -> Result<u64> {
        merge::merge_load(self, table, extraction, loaded_at, conn).await
    }

    /// Delete rows inside the incremental window that the run's merges did
    /// not stamp, i.e. rows gone from the source.
    ///
    /// Runs once per destination table after its last page was merged. For
    /// virtual tables only the groups in `virtual_ids` are touched.
    async fn delete_stale(
        &self,
        extraction: &Extraction,
        request_time: NaiveDateTime,
        loaded_at: NaiveDateTime,
        virtual_ids: &[Value],
        conn: &dyn Connection,
    ) -> Result<u64> {
        merge::delete_stale(self, extraction, request_time, loaded_at, virtual_ids, conn).await
    }

    /// Fetch one page of an extraction's source
    async fn select_data(
        &self,
        extraction: &Extraction,
        request: &SelectRequest,
        conn: &dyn Connection,
        token: &CancellationToken,
    ) -> Result<DataTable> {
        select::select_data(self, extraction, request, conn, token).await
    }

    /// Fetch every dependency of a virtual table and merge them under the
    /// template's schema
    async fn parallel_select(
        &self,
        dependencies: &[Arc<Extraction>],
        fetcher: &dyn DependencyFetcher,
    ) -> Result<DataTable> {
        virtual_table::parallel_select(dependencies, fetcher).await
    }
}

/// Column definitions for `table` plus the quoted key column list.
///
/// Keys are the index column and, for virtual dependencies, the group column.
pub(crate) fn table_columns<D: DialectSql + ?Sized>(
    dialect: &D,
    table: &DataTable,
    extraction: &Extraction,
) -> Result<(Vec<String>, String)> {
    let mut keys = vec![extraction.index_column.as_str()];
    if let Some(group) = extraction.virtual_column() {
        keys.push(group);
    }
    if let Some(missing) = keys.iter().find(|k| table.column_index(k).is_none()) {
        return Err(FerryError::Schema(format!(
            "key column '{}' is missing from '{}'",
            missing, table.name
        )));
    }

    let definitions = table
        .columns
        .iter()
        .map(|column| {
            let is_key = keys.iter().any(|k| k.eq_ignore_ascii_case(&column.name));
            dialect.column_definition(column, is_key)
        })
        .collect::<Result<Vec<_>>>()?;
    let key_list = keys
        .iter()
        .map(|k| dialect.quote_identifier(k))
        .collect::<Vec<_>>()
        .join(", ");
    Ok((definitions, key_list))
}

pub(crate) fn unsupported(kind: DialectKind, native_type: &str) -> FerryError {
    FerryError::UnsupportedType {
        dialect: kind.as_str(),
        native_type: native_type.to_string(),
    }
}
