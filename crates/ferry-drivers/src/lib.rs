//! Ferry drivers - one connection implementation per supported engine
//!
//! Each engine lives in its own crate behind a feature flag; this crate
//! re-exports them and opens connections by dialect.

#[cfg(feature = "clickhouse")]
pub use ferry_driver_clickhouse as clickhouse;
#[cfg(feature = "mssql")]
pub use ferry_driver_mssql as mssql;
#[cfg(feature = "mysql")]
pub use ferry_driver_mysql as mysql;
#[cfg(feature = "postgres")]
pub use ferry_driver_postgres as postgres;

mod connect;

pub use connect::connect;

/// Re-export commonly used types from ferry-core
pub use ferry_core::{Connection, DialectKind, FerryError, QueryResult, Result, Row, StatementResult, Value};
