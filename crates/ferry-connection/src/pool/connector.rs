//! Opening connections for a pool key

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{Connection, DialectKind, Result};

/// Identity of a pool: one pool per distinct connection string and dialect
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub connection_string: String,
    pub dialect: DialectKind,
}

impl PoolKey {
    pub fn new(connection_string: impl Into<String>, dialect: DialectKind) -> Self {
        Self {
            connection_string: connection_string.into(),
            dialect,
        }
    }

    /// Stable short fingerprint of the connection string, safe to log
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.connection_string.hash(&mut hasher);
        format!("{:08x}", hasher.finish() as u32)
    }
}

// Connection strings carry credentials; only the fingerprint is ever printed.
impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.dialect, self.fingerprint())
    }
}

impl fmt::Debug for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolKey")
            .field("dialect", &self.dialect)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Opens new connections for a pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, key: &PoolKey) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable before it is reused
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

/// Connector backed by the compiled-in drivers
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverConnector;

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, key: &PoolKey) -> Result<Arc<dyn Connection>> {
        ferry_drivers::connect(key.dialect, &key.connection_string).await
    }
}
