//! Driver-reported column types mapped to canonical column types
//!
//! Each engine's driver names result columns its own way (`int4`,
//! `MYSQL_TYPE_LONG`, `Int4`, `Nullable(Int32)`). The mapping follows the
//! values that engine's driver actually yields, so a declared type and the
//! values under it agree. Names that are unknown, or that cover values of
//! more than one kind, map to `None` and the values decide.

use crate::{ColumnType, DialectKind};

/// Canonical type of a result column as `dialect`'s driver names it
pub fn native_column_type(dialect: DialectKind, native_type: &str) -> Option<ColumnType> {
    let native_type = native_type.trim();
    if native_type.is_empty() {
        return None;
    }
    match dialect {
        DialectKind::Postgres => postgres_type(native_type),
        DialectKind::MySql => mysql_type(native_type),
        DialectKind::SqlServer => sqlserver_type(native_type),
        DialectKind::ClickHouse => clickhouse_type(native_type),
    }
}

fn postgres_type(native_type: &str) -> Option<ColumnType> {
    let lower = native_type.to_lowercase();
    // Array types are named after their element with a leading underscore
    if lower.starts_with('_') || lower.ends_with("[]") {
        return Some(ColumnType::Array);
    }
    let ty = match lower.as_str() {
        "bool" | "boolean" => ColumnType::Bool,
        "int2" | "smallint" => ColumnType::Int16,
        "int4" | "integer" | "int" => ColumnType::Int32,
        "int8" | "bigint" => ColumnType::Int64,
        "float4" | "real" => ColumnType::Float32,
        "float8" | "double precision" => ColumnType::Float64,
        "numeric" | "decimal" | "money" => ColumnType::Decimal,
        "text" | "varchar" | "bpchar" | "char" | "name" | "citext" => ColumnType::String,
        "bytea" => ColumnType::Bytes,
        "uuid" => ColumnType::Uuid,
        "date" => ColumnType::Date,
        "time" => ColumnType::Time,
        "timestamp" => ColumnType::DateTime,
        "timestamptz" => ColumnType::DateTimeTz,
        "json" | "jsonb" => ColumnType::Json,
        _ => return None,
    };
    Some(ty)
}

fn mysql_type(native_type: &str) -> Option<ColumnType> {
    let upper = native_type.to_uppercase();
    let name = upper.strip_prefix("MYSQL_TYPE_").unwrap_or(&upper);
    let ty = match name {
        // The driver widens every integer width to 64 bits
        "TINY" | "SHORT" | "LONG" | "LONGLONG" | "INT24" | "YEAR" => ColumnType::Int64,
        "FLOAT" => ColumnType::Float32,
        "DOUBLE" => ColumnType::Float64,
        "DECIMAL" | "NEWDECIMAL" => ColumnType::Decimal,
        "VARCHAR" | "VAR_STRING" | "STRING" => ColumnType::String,
        "DATE" | "NEWDATE" => ColumnType::Date,
        "DATETIME" | "DATETIME2" | "TIMESTAMP" | "TIMESTAMP2" => ColumnType::DateTime,
        "JSON" => ColumnType::Json,
        // BLOB covers both TEXT and binary columns
        _ => return None,
    };
    Some(ty)
}

fn sqlserver_type(native_type: &str) -> Option<ColumnType> {
    let ty = match native_type.to_lowercase().as_str() {
        "bit" | "bitn" => ColumnType::Bool,
        "int1" | "int2" => ColumnType::Int16,
        "int4" => ColumnType::Int32,
        "int8" => ColumnType::Int64,
        "float4" => ColumnType::Float32,
        "float8" => ColumnType::Float64,
        "decimaln" | "numericn" | "money" | "money4" => ColumnType::Decimal,
        "bigvarchar" | "bigchar" | "nvarchar" | "nchar" | "text" | "ntext" | "xml" => ColumnType::String,
        "bigvarbin" | "bigbinary" | "image" => ColumnType::Bytes,
        "guid" => ColumnType::Uuid,
        "daten" => ColumnType::Date,
        "timen" => ColumnType::Time,
        "datetime" | "datetime4" | "datetimen" | "datetime2" => ColumnType::DateTime,
        "datetimeoffsetn" => ColumnType::DateTimeTz,
        // `Intn` and `Floatn` carry their width in the column, not the name
        _ => return None,
    };
    Some(ty)
}

/// Strip `Nullable(..)` and `LowCardinality(..)` wrappers
fn clickhouse_base(native_type: &str) -> &str {
    let mut current = native_type;
    loop {
        let inner = ["Nullable(", "LowCardinality("]
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix))
            .and_then(|rest| rest.strip_suffix(')'));
        match inner {
            Some(inner) => current = inner.trim(),
            None => return current,
        }
    }
}

fn clickhouse_type(native_type: &str) -> Option<ColumnType> {
    let base = clickhouse_base(native_type);
    let name = base.split('(').next().unwrap_or(base);
    let ty = match name {
        "Bool" => ColumnType::Bool,
        // Integers arrive as 64-bit values; wider ones may not fit
        "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16" | "UInt32" => ColumnType::Int64,
        "Float32" | "Float64" => ColumnType::Float64,
        "Decimal" | "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => ColumnType::Decimal,
        "String" | "FixedString" => ColumnType::String,
        "UUID" => ColumnType::Uuid,
        "Date" | "Date32" => ColumnType::Date,
        "DateTime" | "DateTime64" => ColumnType::DateTime,
        "Array" => ColumnType::Array,
        _ => return None,
    };
    Some(ty)
}
