//! Connection trait implemented by every driver

use crate::{DialectKind, FerryError, QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// The dialect this connection speaks
    fn dialect(&self) -> DialectKind;

    /// Execute a statement that modifies data or schema (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Load rows into `table` through the engine's native bulk path.
    ///
    /// `table` is already quoted and qualified for the target dialect. Every
    /// row carries one value per entry in `columns`, in the same order.
    /// Returns the number of rows written.
    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64> {
        let _ = (columns, rows);
        Err(FerryError::NotSupported(format!(
            "{} has no bulk path for {}",
            self.driver_name(),
            table
        )))
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
