//! The closed set of engines

use std::ops::Deref;

use ferry_core::{DialectKind, Result};

use crate::dialect::{ExchangeDialect, ExchangeOptions};
use crate::engines::{ClickHouseExchange, MySqlExchange, PostgresExchange, SqlServerExchange};

/// One engine per supported dialect.
///
/// Dereferences to the engine's [`ExchangeDialect`], so every operation is
/// available directly on the enum.
#[derive(Debug, Clone)]
pub enum DbExchange {
    Postgres(PostgresExchange),
    MySql(MySqlExchange),
    SqlServer(SqlServerExchange),
    ClickHouse(ClickHouseExchange),
}

impl DbExchange {
    pub fn for_dialect(kind: DialectKind) -> Self {
        Self::with_options(kind, ExchangeOptions::default())
    }

    pub fn with_options(kind: DialectKind, options: ExchangeOptions) -> Self {
        match kind {
            DialectKind::Postgres => Self::Postgres(PostgresExchange::new(options)),
            DialectKind::MySql => Self::MySql(MySqlExchange::new(options)),
            DialectKind::SqlServer => Self::SqlServer(SqlServerExchange::new(options)),
            DialectKind::ClickHouse => Self::ClickHouse(ClickHouseExchange::new(options)),
        }
    }

    /// Engine for a dialect name such as `"postgres"` or `"mssql"`
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::for_dialect(name.parse()?))
    }

    pub fn engine(&self) -> &(dyn ExchangeDialect + 'static) {
        match self {
            Self::Postgres(engine) => engine,
            Self::MySql(engine) => engine,
            Self::SqlServer(engine) => engine,
            Self::ClickHouse(engine) => engine,
        }
    }
}

impl Deref for DbExchange {
    type Target = dyn ExchangeDialect;

    fn deref(&self) -> &Self::Target {
        self.engine()
    }
}
