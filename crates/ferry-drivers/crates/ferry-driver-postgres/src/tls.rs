//! PostgreSQL TLS support

use ferry_core::FerryError;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::config::SslMode;

/// Error types for the PostgreSQL driver
#[derive(Debug, thiserror::Error)]
pub enum PostgresDriverError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Failed to connect to PostgreSQL: {0}")]
    Connect(String),

    #[error("COPY into {table} failed: {message}")]
    Copy { table: String, message: String },
}

impl From<PostgresDriverError> for FerryError {
    fn from(error: PostgresDriverError) -> Self {
        match error {
            PostgresDriverError::InvalidConnectionString(msg) => FerryError::Configuration(msg),
            PostgresDriverError::Copy { .. } => FerryError::Query(error.to_string()),
            other => FerryError::Connection(other.to_string()),
        }
    }
}

/// Build a TLS connector for the requested SSL mode.
///
/// `require` follows libpq semantics: the channel is encrypted but the
/// server certificate is not verified.
pub fn build_tls_connector(ssl_mode: SslMode) -> Result<MakeTlsConnector, PostgresDriverError> {
    let mut builder = TlsConnector::builder();
    if ssl_mode == SslMode::Require {
        tracing::debug!("disabling certificate verification for sslmode=require");
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build()?;
    Ok(MakeTlsConnector::new(connector))
}
