//! Literal rendering and result decoding for MySQL

use mysql_async::consts::ColumnType;

use ferry_core::Value;

/// Rows per multi-row INSERT
const MAX_ROWS_PER_INSERT: usize = 1000;

/// Upper bound on values in a single statement
const MAX_VALUES_PER_INSERT: usize = 65_535;

/// Escape a value for SQL literal inclusion
pub fn value_to_mysql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int8(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float32(v) if v.is_finite() => v.to_string(),
        Value::Float64(v) if v.is_finite() => v.to_string(),
        Value::Float32(_) | Value::Float64(_) => "NULL".to_string(),
        Value::Decimal(v) if v.parse::<f64>().is_ok() => v.clone(),
        Value::Decimal(v) | Value::String(v) => quote_string(v),
        Value::Bytes(v) => {
            let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
            format!("X'{}'", hex)
        }
        Value::Uuid(v) => format!("'{}'", v),
        Value::Json(v) => quote_string(&v.to_string()),
        Value::DateTimeUtc(v) => format!("'{}'", v.naive_utc().format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Date(v) => format!("'{}'", v),
        Value::Time(v) => format!("'{}'", v),
        Value::DateTime(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Array(_) => quote_string(&value.to_json().to_string()),
    }
}

fn quote_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('\'', "''")
        .replace('\0', "\\0");
    format!("'{}'", escaped)
}

/// Substitute `?` placeholders with literals, leaving quoted text untouched.
pub fn bind_literals(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut params = params.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                out.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => match params.next() {
                    Some(param) => out.push_str(&value_to_mysql_literal(param)),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            },
        }
    }
    out
}

/// Rows per INSERT chunk for a table of `columns` columns
pub fn bulk_chunk_size(columns: usize) -> usize {
    (MAX_VALUES_PER_INSERT / columns.max(1)).clamp(1, MAX_ROWS_PER_INSERT)
}

/// Bytes per character for a collation id, used to turn the byte length
/// MySQL reports into a character length.
pub(crate) fn bytes_per_char(collation: u16) -> u32 {
    match collation {
        63 => 1,
        33 | 83 | 192..=223 => 3,
        45 | 46 | 224..=247 | 255..=323 => 4,
        _ => 1,
    }
}

pub(crate) fn is_string_type(col_type: ColumnType) -> bool {
    matches!(
        col_type,
        ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_STRING
    )
}

/// Convert a mysql_async value to ours, using the column type to interpret
/// the byte strings of the text protocol.
pub(crate) fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => text_to_value(s, col_type),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Int64(i),
            Err(_) => Value::Decimal(u.to_string()),
        },
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32);
            match (date, col_type) {
                (Some(date), ColumnType::MYSQL_TYPE_DATE) => Value::Date(date),
                (Some(date), _) => date
                    .and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Null),
                // Zero dates ('0000-00-00') have no chrono representation
                (None, _) => Value::Null,
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            if !negative && total_hours < 24 {
                if let Some(t) = chrono::NaiveTime::from_hms_micro_opt(
                    total_hours,
                    mins as u32,
                    secs as u32,
                    micros,
                ) {
                    return Value::Time(t);
                }
            }
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn text_to_value(s: String, col_type: ColumnType) -> Value {
    match col_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_YEAR => match s.parse::<i64>() {
            Ok(i) => Value::Int64(i),
            Err(_) => Value::String(s),
        },
        ColumnType::MYSQL_TYPE_FLOAT => match s.parse::<f32>() {
            Ok(f) => Value::Float32(f),
            Err(_) => Value::String(s),
        },
        ColumnType::MYSQL_TYPE_DOUBLE => match s.parse::<f64>() {
            Ok(f) => Value::Float64(f),
            Err(_) => Value::String(s),
        },
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => Value::Decimal(s),
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            match chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => Value::Date(d),
                Err(_) => Value::Null,
            }
        }
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            match chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f") {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => Value::Null,
            }
        }
        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_str(&s) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::String(s),
        },
        _ => Value::String(s),
    }
}

#[cfg(test)]
mod tests;
