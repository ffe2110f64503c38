//! PostgreSQL driver implementation

mod connection;
mod copy;
mod tls;
mod value;

pub use connection::PostgresConnection;
pub use tls::{PostgresDriverError, build_tls_connector};
