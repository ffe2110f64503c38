//! MS SQL Server connection implementation using tiberius

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tiberius::{Client, Config, Row as TiberiusRow, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use ferry_core::{
    ColumnMeta, Connection, DialectKind, FerryError, QueryResult, Result, Row, StatementResult,
    Value,
};

use crate::bulk::bulk_load;
use crate::value::{column_data_to_value, values_to_tiberius_params};

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for FerryError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::InvalidConnectionString(msg) => FerryError::Configuration(msg),
            other => FerryError::Connection(other.to_string()),
        }
    }
}

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    client: Mutex<Client<Compat<TcpStream>>>,
    closed: AtomicBool,
}

impl MssqlConnection {
    /// Connect using an ADO.NET connection string
    /// (`server=tcp:host,1433;database=..;user=..;password=..;TrustServerCertificate=true`).
    #[tracing::instrument(skip(connection_string))]
    pub async fn connect(connection_string: &str) -> std::result::Result<Self, MssqlConnectionError> {
        let config = Config::from_ado_string(connection_string)
            .map_err(|e| MssqlConnectionError::InvalidConnectionString(e.to_string()))?;

        tracing::debug!(addr = %config.get_addr(), "connecting to MS SQL Server");

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("successfully connected to MS SQL Server");
        Ok(Self {
            client: Mutex::new(client),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_not_closed(&self) -> std::result::Result<(), MssqlConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    fn dialect(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();
        let mut client = self.client.lock().await;

        let tiberius_params = values_to_tiberius_params(params);
        let param_refs: Vec<&dyn ToSql> = tiberius_params.iter().map(|p| p as &dyn ToSql).collect();

        let result = client.execute(sql, &param_refs[..]).await.map_err(|e| {
            tracing::error!(error = %e, "execute failed");
            FerryError::Query(e.to_string())
        })?;

        let affected_rows = result.rows_affected().iter().sum::<u64>();
        tracing::debug!(
            affected_rows = affected_rows,
            duration_ms = start.elapsed().as_millis() as u64,
            "execute completed"
        );
        Ok(StatementResult::affected(affected_rows))
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();
        let mut client = self.client.lock().await;

        let tiberius_params = values_to_tiberius_params(params);
        let param_refs: Vec<&dyn ToSql> = tiberius_params.iter().map(|p| p as &dyn ToSql).collect();

        let mut stream = client.query(sql, &param_refs[..]).await.map_err(|e| {
            tracing::error!(error = %e, "query failed");
            FerryError::Query(e.to_string())
        })?;

        // Metadata arrives before any row so empty results keep their shape.
        let columns: Vec<ColumnMeta> = stream
            .columns()
            .await
            .map_err(|e| FerryError::Query(e.to_string()))?
            .map(|cols| {
                cols.iter()
                    .enumerate()
                    .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                    .collect()
            })
            .unwrap_or_default();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let tib_rows = stream
            .into_first_result()
            .await
            .map_err(|e| FerryError::Query(e.to_string()))?;

        let rows = tib_rows
            .into_iter()
            .map(|tib_row| Ok(Row::new(column_names.clone(), tiberius_row_to_values(tib_row)?)))
            .collect::<Result<Vec<Row>>>()?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            duration_ms = execution_time_ms,
            "query completed"
        );

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64> {
        self.ensure_not_closed()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let mut client = self.client.lock().await;
        let written = bulk_load(&mut client, table, columns, rows).await?;
        tracing::debug!(table = %table, rows = written, "bulk load complete");
        Ok(written)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        nullable: true,
        ordinal,
        max_length: None,
    }
}

fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    row.into_iter().map(column_data_to_value).collect()
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
