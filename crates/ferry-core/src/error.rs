//! Error types for ferry

use thiserror::Error;

/// Core error type for ferry operations
#[derive(Error, Debug)]
pub enum FerryError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unsupported type '{native_type}' for {dialect}")]
    UnsupportedType {
        dialect: &'static str,
        native_type: String,
    },

    #[error("Virtual table '{0}' has no template dependency")]
    MissingTemplate(String),

    #[error("Timed out after {timeout_ms}ms acquiring a connection for {key}")]
    AcquisitionTimeout { key: String, timeout_ms: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl FerryError {
    /// Whether the failure is transient and worth another attempt.
    ///
    /// Connectivity and execution failures are retried; structural failures
    /// (missing template, unmappable types, bad configuration) fail fast.
    /// Cancellation is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FerryError::Connection(_)
                | FerryError::Query(_)
                | FerryError::Driver(_)
                | FerryError::Io(_)
                | FerryError::Timeout(_)
                | FerryError::AcquisitionTimeout { .. }
                | FerryError::Other(_)
        )
    }

    /// Whether the failure is a cooperative cancellation rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FerryError::Cancelled)
    }
}

/// Result type alias for ferry operations
pub type Result<T> = std::result::Result<T, FerryError>;
