//! The closed set of database engines ferry can read from and write to

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FerryError;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    MySql,
    SqlServer,
    ClickHouse,
}

impl DialectKind {
    pub const ALL: [DialectKind; 4] = [
        DialectKind::Postgres,
        DialectKind::MySql,
        DialectKind::SqlServer,
        DialectKind::ClickHouse,
    ];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::MySql => "mysql",
            DialectKind::SqlServer => "sqlserver",
            DialectKind::ClickHouse => "clickhouse",
        }
    }

    /// Schema used when an extraction has no origin alias to derive one from
    pub fn default_schema(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "public",
            DialectKind::SqlServer => "dbo",
            DialectKind::MySql | DialectKind::ClickHouse => "ferry",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectKind::SqlServer),
            "clickhouse" | "ch" => Ok(DialectKind::ClickHouse),
            other => Err(FerryError::Configuration(format!(
                "unknown dialect '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_aliases() {
        assert_eq!("PostgreSQL".parse::<DialectKind>().ok(), Some(DialectKind::Postgres));
        assert_eq!("mariadb".parse::<DialectKind>().ok(), Some(DialectKind::MySql));
        assert_eq!("mssql".parse::<DialectKind>().ok(), Some(DialectKind::SqlServer));
        assert_eq!(" clickhouse ".parse::<DialectKind>().ok(), Some(DialectKind::ClickHouse));
        assert!("oracle".parse::<DialectKind>().is_err());
    }

    #[test]
    fn test_round_trip_through_name() {
        for kind in DialectKind::ALL {
            assert_eq!(kind.as_str().parse::<DialectKind>().ok(), Some(kind));
        }
    }
}
