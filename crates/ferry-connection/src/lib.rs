//! Ferry Connection - connection pooling keyed by (connection string, dialect)
//!
//! This crate owns the lifetime of every database connection the pipeline
//! uses: lazy pool creation, pre-warm, idle reaping and bounded acquisition.

mod backoff;
pub mod pool;

pub use backoff::BackoffStrategy;
pub use pool::{
    ConnectionPool, Connector, DriverConnector, PoolConfig, PoolKey, PoolRegistry, PoolStats,
    PooledConnection,
};
