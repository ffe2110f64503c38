//! PostgreSQL connection implementation

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use ferry_core::{
    ColumnMeta, Connection, DialectKind, FerryError, QueryResult, Result, Row, StatementResult,
    Value,
};

use crate::copy::copy_rows;
use crate::tls::{PostgresDriverError, build_tls_connector};
use crate::value::{PgValue, format_postgres_error, postgres_to_value};

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
    closed: Arc<AtomicBool>,
}

impl PostgresConnection {
    /// Connect using a libpq-style connection string
    /// (`host=... user=... dbname=...` or `postgres://...`).
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let config = tokio_postgres::Config::from_str(connection_string)
            .map_err(|e| PostgresDriverError::InvalidConnectionString(e.to_string()))?;

        tracing::info!(
            dbname = ?config.get_dbname(),
            ssl_mode = ?config.get_ssl_mode(),
            "connecting to PostgreSQL database"
        );

        let closed = Arc::new(AtomicBool::new(false));
        let client = if config.get_ssl_mode() == SslMode::Disable {
            let (client, connection) = config
                .connect(NoTls)
                .await
                .map_err(|e| PostgresDriverError::Connect(format_postgres_error(&e)))?;
            spawn_connection_task(connection, Arc::clone(&closed));
            client
        } else {
            let tls = build_tls_connector(config.get_ssl_mode())?;
            let (client, connection) = config
                .connect(tls)
                .await
                .map_err(|e| PostgresDriverError::Connect(format_postgres_error(&e)))?;
            spawn_connection_task(connection, Arc::clone(&closed));
            client
        };

        tracing::info!("PostgreSQL connection established");
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            closed,
        })
    }
}

fn spawn_connection_task<F>(connection: F, closed: Arc<AtomicBool>)
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>
        + Send
        + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection error");
        }
        closed.store(true, Ordering::SeqCst);
    });
}

fn bind_params(params: &[Value], param_types: &[tokio_postgres::types::Type]) -> Vec<PgValue> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| match param_types.get(i) {
            Some(target_type) => PgValue::from_value_for_type(value, target_type),
            None => PgValue::from_value(value),
        })
        .collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    fn dialect(&self) -> DialectKind {
        DialectKind::Postgres
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let client = self.client.lock().await;

        // Parameterless statements go through the simple protocol so DDL
        // batches and DO blocks work.
        if params.is_empty() {
            let messages = client
                .simple_query(sql)
                .await
                .map_err(|e| FerryError::Query(format_postgres_error(&e)))?;
            let affected = messages
                .iter()
                .filter_map(|m| match m {
                    tokio_postgres::SimpleQueryMessage::CommandComplete(n) => Some(*n),
                    _ => None,
                })
                .sum();
            tracing::debug!(affected_rows = affected, "statement executed");
            return Ok(StatementResult::affected(affected));
        }

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| FerryError::Query(format!("Failed to prepare statement: {}", format_postgres_error(&e))))?;

        let pg_params = bind_params(params, statement.params());
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows_affected = client
            .execute(&statement, &param_refs)
            .await
            .map_err(|e| FerryError::Query(format!("Failed to execute statement: {}", format_postgres_error(&e))))?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult::affected(rows_affected))
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let client = self.client.lock().await;

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| FerryError::Query(format!("Failed to prepare query: {}", format_postgres_error(&e))))?;

        let pg_params = bind_params(params, statement.params());
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| FerryError::Query(format!("Failed to execute query: {}", format_postgres_error(&e))))?;

        // Column metadata comes from the statement so empty results keep their shape.
        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMeta {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                nullable: true,
                ordinal: idx,
                max_length: None,
            })
            .collect();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let rows: Vec<Row> = pg_rows
            .iter()
            .map(|pg_row| {
                let values = (0..columns.len())
                    .map(|idx| postgres_to_value(pg_row, idx))
                    .collect();
                Row::new(column_names.clone(), values)
            })
            .collect();

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
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
        if rows.is_empty() {
            return Ok(0);
        }
        copy_rows(&self.client, table, columns, rows).await
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self
                .client
                .try_lock()
                .map(|client| client.is_closed())
                .unwrap_or(false)
    }
}
