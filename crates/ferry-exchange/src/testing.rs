//! Recording connection shared by the engine tests

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ferry_core::{
    ColumnMeta, Connection, DataColumn, DataTable, DialectKind, Extraction, FerryError,
    QueryResult, Result, Row, StatementResult, Value,
};

/// A bulk insert as the connection saw it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BulkCall {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Records every statement; answers queries from a script matched by substring
pub(crate) struct RecordingConnection {
    dialect: DialectKind,
    statements: parking_lot::Mutex<Vec<String>>,
    bulk: parking_lot::Mutex<Vec<BulkCall>>,
    script: parking_lot::Mutex<Vec<(String, QueryResult)>>,
    fail_on: parking_lot::Mutex<Option<String>>,
    hang: AtomicBool,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            statements: parking_lot::Mutex::new(Vec::new()),
            bulk: parking_lot::Mutex::new(Vec::new()),
            script: parking_lot::Mutex::new(Vec::new()),
            fail_on: parking_lot::Mutex::new(None),
            hang: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Answer queries containing `needle` with `result`
    pub fn respond(&self, needle: &str, result: QueryResult) {
        self.script.lock().push((needle.to_string(), result));
    }

    /// Fail any statement containing `needle`
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock() = Some(needle.to_string());
    }

    /// Never answer queries
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn bulk_calls(&self) -> Vec<BulkCall> {
        self.bulk.lock().clone()
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.statements.lock().push(sql.to_string());
        match self.fail_on.lock().as_deref() {
            Some(needle) if sql.contains(needle) => Err(FerryError::Query(format!("scripted failure: {}", needle))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn driver_name(&self) -> &str {
        "recording"
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
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let script = self.script.lock();
        let answer = script
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, result)| result.clone());
        Ok(answer.unwrap_or_else(QueryResult::empty))
    }

    async fn bulk_insert(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<u64> {
        self.record(table)?;
        self.bulk.lock().push(BulkCall {
            table: table.to_string(),
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(rows.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Query result with the given column names and rows
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

/// `orders(id int64 key, status string(20), updated_at datetime)` with two rows
pub(crate) fn orders_table() -> DataTable {
    let updated = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid timestamp");
    let mut table = DataTable::new(
        "orders",
        vec![
            DataColumn::new("id", ferry_core::ColumnType::Int64).not_null(),
            DataColumn::new("status", ferry_core::ColumnType::String).with_max_length(20),
            DataColumn::new("updated_at", ferry_core::ColumnType::DateTime),
        ],
    );
    table
        .push_row(vec![Value::Int64(1), Value::String("open".into()), Value::DateTime(updated)])
        .expect("row fits");
    table
        .push_row(vec![Value::Int64(2), Value::String("shipped".into()), Value::DateTime(updated)])
        .expect("row fits");
    table
}

/// Incremental `sales.orders` extraction with a one-hour window
pub(crate) fn orders_extraction(dialect: DialectKind) -> Extraction {
    Extraction::new(1, "dbo.orders", "id")
        .with_alias("orders")
        .with_origin(ferry_core::Origin {
            id: 1,
            name: "Sales".into(),
            alias: "sales".into(),
            dialect,
            connection_string: String::new(),
            timezone_offset_hours: 0,
        })
        .incremental("updated_at", 3600)
}

pub(crate) fn at(hour: u32, minute: u32) -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid timestamp")
}
