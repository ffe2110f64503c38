//! One engine per supported database

mod clickhouse;
mod mysql;
mod postgres;
mod sqlserver;

pub use clickhouse::ClickHouseExchange;
pub use mysql::MySqlExchange;
pub use postgres::PostgresExchange;
pub use sqlserver::SqlServerExchange;
