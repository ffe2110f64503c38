//! Connection pooling for database connections
//!
//! One `ConnectionPool` exists per distinct `PoolKey`. Pools are created on
//! first use by the `PoolRegistry`, pre-warmed in the background and reaped
//! periodically.
//!
//! # Example
//!
//! ```ignore
//! use ferry_connection::{PoolConfig, PoolKey, PoolRegistry};
//! use ferry_core::DialectKind;
//!
//! let registry = PoolRegistry::new(PoolConfig::new(1, 8));
//! let key = PoolKey::new("postgres://localhost/sales", DialectKind::Postgres);
//! let conn = registry.acquire(&key).await?;
//! conn.query("SELECT 1", &[]).await?;
//! conn.release().await;
//! ```

mod config;
mod connector;
mod pool;
mod registry;
mod stats;


pub use config::PoolConfig;
pub use connector::{Connector, DriverConnector, PoolKey};
pub use pool::{ConnectionPool, PooledConnection};
pub use registry::PoolRegistry;
pub use stats::PoolStats;
