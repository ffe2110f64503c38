//! Open a connection for a dialect

use std::sync::Arc;

use ferry_core::{Connection, DialectKind, FerryError, Result};

/// Open a new connection to `connection_string` using the driver for `dialect`
#[tracing::instrument(skip(connection_string))]
pub async fn connect(dialect: DialectKind, connection_string: &str) -> Result<Arc<dyn Connection>> {
    tracing::debug!(dialect = %dialect, "opening connection");
    match dialect {
        #[cfg(feature = "postgres")]
        DialectKind::Postgres => {
            let conn = crate::postgres::PostgresConnection::connect(connection_string).await?;
            Ok(Arc::new(conn))
        }
        #[cfg(feature = "mysql")]
        DialectKind::MySql => {
            let conn = crate::mysql::MySqlConnection::connect(connection_string).await?;
            Ok(Arc::new(conn))
        }
        #[cfg(feature = "mssql")]
        DialectKind::SqlServer => {
            let conn = crate::mssql::MssqlConnection::connect(connection_string).await?;
            Ok(Arc::new(conn))
        }
        #[cfg(feature = "clickhouse")]
        DialectKind::ClickHouse => {
            let conn = crate::clickhouse::ClickHouseConnection::connect(connection_string).await?;
            Ok(Arc::new(conn))
        }
        #[allow(unreachable_patterns)]
        other => {
            let _ = connection_string;
            Err(FerryError::NotSupported(format!(
                "driver for {} is not compiled in",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "clickhouse")]
    #[tokio::test]
    async fn test_clickhouse_rejects_malformed_url() {
        let result = connect(DialectKind::ClickHouse, "not a url").await;
        assert!(matches!(result, Err(FerryError::Configuration(_))));
    }

    #[cfg(feature = "mysql")]
    #[tokio::test]
    async fn test_mysql_rejects_malformed_url() {
        let result = connect(DialectKind::MySql, "host=localhost").await;
        assert!(matches!(result, Err(FerryError::Configuration(_))));
    }

    #[cfg(feature = "mssql")]
    #[tokio::test]
    async fn test_mssql_rejects_malformed_string() {
        let result = connect(DialectKind::SqlServer, "server=tcp:localhost,notaport").await;
        assert!(result.is_err());
    }
}
