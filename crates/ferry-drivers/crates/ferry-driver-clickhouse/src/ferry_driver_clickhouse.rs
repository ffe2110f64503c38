//! ClickHouse driver implementation over the HTTP interface

mod connection;
mod value;

pub use connection::ClickHouseConnection;
pub use value::json_to_value;
