//! Ferry Exchange - dialect engines for moving tables between databases
//!
//! Each supported engine knows how to quote, paginate, filter and type its
//! SQL, and how to create, bulk-load and merge into destination tables:
//!
//! - [`PostgresExchange`] - `LIMIT/OFFSET`, binary `COPY`
//! - [`MySqlExchange`] - `LIMIT/OFFSET`, chunked multi-row `INSERT`
//! - [`SqlServerExchange`] - `OFFSET .. FETCH`, `WITH (NOLOCK)`, TDS bulk load
//! - [`ClickHouseExchange`] - `ReplacingMergeTree` destinations, `JSONEachRow` inserts
//!
//! [`DbExchange`] is the closed set of engines, built from a [`DialectKind`]
//! or a dialect name.

mod dialect;
mod engines;
mod exchange;
mod merge;
mod select;
mod sql;
mod virtual_table;

#[cfg(test)]
mod testing;

pub use dialect::{DependencyFetcher, DialectSql, ExchangeDialect, ExchangeOptions, SelectRequest};
pub use engines::{ClickHouseExchange, MySqlExchange, PostgresExchange, SqlServerExchange};
pub use exchange::DbExchange;
pub use merge::MergePlan;
pub use sql::{ROW_ID_COLUMN, UPDATED_AT_COLUMN};

pub use ferry_core::DialectKind;
