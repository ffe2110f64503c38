//! Fake databases and fixtures shared by the pipeline tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use ferry_connection::{Connector, PoolConfig, PoolKey, PoolRegistry};
use ferry_core::{
    ColumnMeta, Connection, Destination, DialectKind, Extraction, FerryError, Origin, QueryResult,
    Result, Row, StatementResult, Value,
};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::telemetry::JobTelemetry;

pub(crate) const SOURCE: &str = "postgres://etl@source/sales";
pub(crate) const WAREHOUSE: &str = "postgres://etl@warehouse/dw";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BulkCall {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A database that records what it is sent and answers from a script.
///
/// Every pooled connection to the same connection string shares one
/// instance, so assertions see the whole run.
pub(crate) struct FakeDatabase {
    dialect: DialectKind,
    statements: parking_lot::Mutex<Vec<String>>,
    bulk: parking_lot::Mutex<Vec<BulkCall>>,
    script: parking_lot::Mutex<Vec<(String, QueryResult)>>,
    /// Statements containing the needle fail while the count is positive
    failures: parking_lot::Mutex<Vec<(String, usize)>>,
    /// Bulk inserts into exactly this table fail while the count is positive
    bulk_failures: parking_lot::Mutex<Vec<(String, usize)>>,
    closes: AtomicUsize,
}

impl FakeDatabase {
    pub fn new(dialect: DialectKind) -> Arc<Self> {
        Arc::new(Self {
            dialect,
            statements: parking_lot::Mutex::new(Vec::new()),
            bulk: parking_lot::Mutex::new(Vec::new()),
            script: parking_lot::Mutex::new(Vec::new()),
            failures: parking_lot::Mutex::new(Vec::new()),
            bulk_failures: parking_lot::Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn respond(&self, needle: &str, result: QueryResult) {
        self.script.lock().push((needle.to_string(), result));
    }

    pub fn fail_times(&self, needle: &str, times: usize) {
        self.failures.lock().push((needle.to_string(), times));
    }

    pub fn fail_bulk_into(&self, table: &str, times: usize) {
        self.bulk_failures.lock().push((table.to_string(), times));
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn statements_containing(&self, needle: &str) -> Vec<String> {
        self.statements().into_iter().filter(|s| s.contains(needle)).collect()
    }

    pub fn bulk_calls(&self) -> Vec<BulkCall> {
        self.bulk.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn take_failure(list: &parking_lot::Mutex<Vec<(String, usize)>>, matches: impl Fn(&str) -> bool) -> bool {
        let mut list = list.lock();
        match list.iter_mut().find(|(needle, left)| *left > 0 && matches(needle)) {
            Some((_, left)) => {
                *left -= 1;
                true
            }
            None => false,
        }
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.statements.lock().push(sql.to_string());
        if Self::take_failure(&self.failures, |needle| sql.contains(needle)) {
            return Err(FerryError::Query(format!("scripted failure: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for FakeDatabase {
    fn driver_name(&self) -> &str {
        "fake"
    }

    fn dialect(&self) -> DialectKind {
        self.dialect
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.record(sql)?;
        Ok(StatementResult::affected(1))
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.record(sql)?;
        let script = self.script.lock();
        Ok(script
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(QueryResult::empty))
    }

    async fn bulk_insert(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<u64> {
        self.statements.lock().push(format!("BULK {}", table));
        if Self::take_failure(&self.bulk_failures, |target| target == table) {
            return Err(FerryError::Query(format!("bulk insert into {} rejected", table)));
        }
        self.bulk.lock().push(BulkCall {
            table: table.to_string(),
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(rows.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// Hands out the fake registered for each connection string
#[derive(Default)]
pub(crate) struct FakeConnector {
    databases: DashMap<String, Arc<FakeDatabase>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, connection_string: &str, database: Arc<FakeDatabase>) {
        self.databases.insert(connection_string.to_string(), database);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, key: &PoolKey) -> Result<Arc<dyn Connection>> {
        match self.databases.get(&key.connection_string) {
            Some(database) => Ok(Arc::clone(database.value()) as Arc<dyn Connection>),
            None => Err(FerryError::Connection(format!("no database at {}", key))),
        }
    }
}

/// Records every byte report
#[derive(Default)]
pub(crate) struct RecordingTelemetry {
    pub reports: parking_lot::Mutex<Vec<(i64, u64)>>,
}

impl JobTelemetry for RecordingTelemetry {
    fn record_bytes(&self, extraction_id: i64, bytes: u64) {
        self.reports.lock().push((extraction_id, bytes));
    }
}

/// Fast retries, no pre-warmed connections
pub(crate) fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_backoff_ms(1, 5)
        .with_page_limit(2)
        .with_pool(PoolConfig::new(0, 4).with_acquire_timeout_ms(1_000))
}

pub(crate) fn registry(connector: Arc<FakeConnector>) -> Arc<PoolRegistry> {
    Arc::new(PoolRegistry::with_connector(PoolConfig::new(0, 4), connector))
}

pub(crate) fn context(config: PipelineConfig, connector: Arc<FakeConnector>, preflight: bool) -> Arc<RunContext> {
    Arc::new(RunContext::new(
        Arc::new(config),
        registry(connector),
        Arc::new(crate::telemetry::NoopTelemetry),
        CancellationToken::new(),
        at(12, 0),
        preflight,
    ))
}

pub(crate) fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid timestamp")
}

pub(crate) fn sales_origin(connection_string: &str) -> Origin {
    Origin {
        id: 1,
        name: "Sales".into(),
        alias: "sales".into(),
        dialect: DialectKind::Postgres,
        connection_string: connection_string.into(),
        timezone_offset_hours: 0,
    }
}

pub(crate) fn warehouse() -> Destination {
    Destination {
        id: 1,
        name: "Warehouse".into(),
        alias: "dw".into(),
        dialect: DialectKind::Postgres,
        connection_string: WAREHOUSE.into(),
        timezone_offset_hours: 0,
    }
}

/// `orders` from the sales source into the warehouse
pub(crate) fn orders(id: i64) -> Extraction {
    Extraction::new(id, "orders", "id")
        .with_origin(sales_origin(SOURCE))
        .with_destination(warehouse())
}

pub(crate) fn query_result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    QueryResult {
        columns: names
            .iter()
            .enumerate()
            .map(|(ordinal, name)| ColumnMeta {
                name: name.clone(),
                ordinal,
                nullable: true,
                ..Default::default()
            })
            .collect(),
        rows: rows.into_iter().map(|values| Row::new(names.clone(), values)).collect(),
        affected_rows: 0,
        execution_time_ms: 0,
    }
}

/// `(id, status, updated_at)` rows for ids in `ids`
pub(crate) fn order_rows(ids: std::ops::Range<i64>) -> QueryResult {
    query_result(
        &["id", "status", "updated_at"],
        ids.map(|id| {
            vec![
                Value::Int64(id),
                Value::String(if id % 2 == 0 { "open" } else { "shipped" }.into()),
                Value::DateTime(at(11, 30)),
            ]
        })
        .collect(),
    )
}

pub(crate) fn scalar(value: i64) -> QueryResult {
    query_result(&["value"], vec![vec![Value::Int64(value)]])
}
