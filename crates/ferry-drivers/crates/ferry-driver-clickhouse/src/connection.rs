//! ClickHouse connection implementation

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use ferry_core::{
    Connection, DialectKind, FerryError, QueryResult, Result, StatementResult, Value,
};

use crate::value::{bind_literals, escape_bind_markers, json_each_row, parse_compact_body};

/// Rows per `INSERT .. FORMAT JSONEachRow` request
const INSERT_CHUNK_ROWS: usize = 10_000;

/// Endpoint and credentials parsed from a connection URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClickHouseTarget {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Parse `http(s)://user:pass@host:port/db`; `clickhouse://` is treated as plain HTTP
pub(crate) fn parse_connection_url(connection_string: &str) -> Result<ClickHouseTarget> {
    let parsed = url::Url::parse(connection_string)
        .map_err(|e| FerryError::Configuration(format!("Invalid ClickHouse URL: {}", e)))?;

    let scheme = match parsed.scheme() {
        "http" | "clickhouse" => "http",
        "https" | "clickhouses" => "https",
        other => {
            return Err(FerryError::Configuration(format!(
                "Unsupported ClickHouse URL scheme '{}'",
                other
            )));
        }
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| FerryError::Configuration("ClickHouse URL has no host".into()))?;
    let port = parsed.port().unwrap_or(if scheme == "https" { 8443 } else { 8123 });

    let user = match parsed.username() {
        "" => "default".to_string(),
        name => name.to_string(),
    };
    let database = match parsed.path().trim_start_matches('/') {
        "" => "default".to_string(),
        db => db.to_string(),
    };

    Ok(ClickHouseTarget {
        url: format!("{}://{}:{}", scheme, host, port),
        user,
        password: parsed.password().unwrap_or_default().to_string(),
        database,
    })
}

/// ClickHouse connection wrapper implementing the Connection trait
pub struct ClickHouseConnection {
    client: clickhouse::Client,
    database: String,
    closed: AtomicBool,
}

impl ClickHouseConnection {
    /// Connect and verify the server answers
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let target = parse_connection_url(connection_string)?;
        tracing::debug!(url = %target.url, database = %target.database, "connecting to ClickHouse");

        let client = clickhouse::Client::default()
            .with_url(&target.url)
            .with_user(&target.user)
            .with_password(&target.password)
            .with_database(&target.database)
            .with_option("date_time_input_format", "best_effort");

        let probe: std::result::Result<u8, clickhouse::error::Error> =
            client.query("SELECT 1").fetch_one().await;
        if let Err(e) = probe {
            return Err(FerryError::Connection(format!("Failed to connect to ClickHouse: {}", e)));
        }

        tracing::debug!("ClickHouse connection established");
        Ok(Self {
            client,
            database: target.database,
            closed: AtomicBool::new(false),
        })
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FerryError::Connection("Connection is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for ClickHouseConnection {
    fn driver_name(&self) -> &str {
        "clickhouse"
    }

    fn dialect(&self) -> DialectKind {
        DialectKind::ClickHouse
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();
        let final_sql = escape_bind_markers(&bind_literals(sql, params));

        self.client
            .query(&final_sql)
            .execute()
            .await
            .map_err(|e| FerryError::Query(format!("Execute failed: {}", e)))?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "execute completed"
        );
        // ClickHouse does not report affected rows over HTTP
        Ok(StatementResult::default())
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();
        let final_sql = escape_bind_markers(&bind_literals(sql, params));

        let mut cursor = self
            .client
            .query(&final_sql)
            .fetch_bytes("JSONCompactEachRowWithNamesAndTypes")
            .map_err(|e| FerryError::Query(format!("Query failed: {}", e)))?;

        let mut all_bytes = Vec::new();
        while let Some(chunk) = cursor
            .next()
            .await
            .map_err(|e| FerryError::Query(format!("Failed to read query result: {}", e)))?
        {
            all_bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&all_bytes);
        let (columns, rows) = parse_compact_body(&body)?;

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
        let column_list = columns
            .iter()
            .map(|c| format!("`{}`", c.replace('`', "\\`")))
            .collect::<Vec<_>>()
            .join(", ");

        let mut written = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let statement = format!(
                "INSERT INTO {} ({}) FORMAT JSONEachRow\n{}",
                table,
                column_list,
                json_each_row(columns, chunk)
            );
            self.client
                .query(&escape_bind_markers(&statement))
                .execute()
                .await
                .map_err(|e| FerryError::Query(format!("Insert into {} failed: {}", table, e)))?;
            written += chunk.len() as u64;
        }

        tracing::debug!(table = %table, rows = written, "bulk insert complete");
        Ok(written)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("ClickHouse connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ClickHouseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConnection")
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
