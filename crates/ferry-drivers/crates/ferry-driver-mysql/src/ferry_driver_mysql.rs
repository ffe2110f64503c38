//! MySQL/MariaDB driver implementation

mod connection;
mod value;

pub use connection::MySqlConnection;
pub use value::{bind_literals, bulk_chunk_size, value_to_mysql_literal};
