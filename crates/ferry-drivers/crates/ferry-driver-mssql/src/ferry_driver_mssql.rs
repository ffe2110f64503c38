//! MS SQL Server driver implementation using tiberius

mod bulk;
mod connection;
mod value;

pub use connection::{MssqlConnection, MssqlConnectionError};
