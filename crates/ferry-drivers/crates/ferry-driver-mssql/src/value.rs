//! Conversions between ferry values and tiberius column data

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, FromSqlOwned, IntoSql, ToSql};

use ferry_core::{FerryError, Result, Value};

/// Convert tiberius column data to a ferry value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    let value = match col_data {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(|v| Value::Int16(v as i16)).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::Int16).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::Int32).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::Int64).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(Value::Float32).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::Float64).unwrap_or(Value::Null),
        ColumnData::String(v) => v.map(|s| Value::String(s.into_owned())).unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(Value::Uuid).unwrap_or(Value::Null),
        ColumnData::Binary(v) => v.map(|b| Value::Bytes(b.into_owned())).unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v.map(|n| Value::Decimal(n.to_string())).unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .map(|x| Value::String(x.into_owned().into_string()))
            .unwrap_or(Value::Null),
        data @ (ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_)) => {
            NaiveDateTime::from_sql_owned(data)
                .map_err(|e| FerryError::Driver(e.to_string()))?
                .map(Value::DateTime)
                .unwrap_or(Value::Null)
        }
        data @ ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::Utc>::from_sql_owned(data)
            .map_err(|e| FerryError::Driver(e.to_string()))?
            .map(Value::DateTimeUtc)
            .unwrap_or(Value::Null),
        data @ ColumnData::Date(_) => NaiveDate::from_sql_owned(data)
            .map_err(|e| FerryError::Driver(e.to_string()))?
            .map(Value::Date)
            .unwrap_or(Value::Null),
        data @ ColumnData::Time(_) => NaiveTime::from_sql_owned(data)
            .map_err(|e| FerryError::Driver(e.to_string()))?
            .map(Value::Time)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

/// Container for tiberius parameter values
#[derive(Debug)]
pub(crate) enum TiberiusParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TiberiusParam::Null => ColumnData::I32(None),
            TiberiusParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TiberiusParam::I16(v) => ColumnData::I16(Some(*v)),
            TiberiusParam::I32(v) => ColumnData::I32(Some(*v)),
            TiberiusParam::I64(v) => ColumnData::I64(Some(*v)),
            TiberiusParam::F32(v) => ColumnData::F32(Some(*v)),
            TiberiusParam::F64(v) => ColumnData::F64(Some(*v)),
            TiberiusParam::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            TiberiusParam::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
            TiberiusParam::Uuid(v) => ColumnData::Guid(Some(*v)),
            TiberiusParam::Date(v) => v.to_sql(),
            TiberiusParam::Time(v) => v.to_sql(),
            TiberiusParam::DateTime(v) => v.to_sql(),
            TiberiusParam::DateTimeUtc(v) => v.to_sql(),
        }
    }
}

/// Convert ferry values to tiberius parameters
pub(crate) fn values_to_tiberius_params(values: &[Value]) -> Vec<TiberiusParam> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => TiberiusParam::Null,
            Value::Bool(b) => TiberiusParam::Bool(*b),
            Value::Int8(i) => TiberiusParam::I16(*i as i16),
            Value::Int16(i) => TiberiusParam::I16(*i),
            Value::Int32(i) => TiberiusParam::I32(*i),
            Value::Int64(i) => TiberiusParam::I64(*i),
            Value::Float32(f) => TiberiusParam::F32(*f),
            Value::Float64(f) => TiberiusParam::F64(*f),
            Value::Decimal(d) => TiberiusParam::String(d.clone()),
            Value::String(s) => TiberiusParam::String(s.clone()),
            Value::Bytes(b) => TiberiusParam::Bytes(b.clone()),
            Value::Uuid(u) => TiberiusParam::Uuid(*u),
            Value::Date(d) => TiberiusParam::Date(*d),
            Value::Time(t) => TiberiusParam::Time(*t),
            Value::DateTime(dt) => TiberiusParam::DateTime(*dt),
            Value::DateTimeUtc(dt) => TiberiusParam::DateTimeUtc(*dt),
            Value::Json(_) | Value::Array(_) => TiberiusParam::String(v.to_json().to_string()),
        })
        .collect()
}

/// Physical type of a destination column, as named by `sys.types`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlKind {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal { scale: u8 },
    Text,
    Binary,
    Guid,
    Date,
    Time,
    DateTime2,
    DateTime,
    SmallDateTime,
    DateTimeOffset,
}

impl SqlKind {
    pub(crate) fn from_type_name(type_name: &str, scale: u8) -> Self {
        match type_name.to_ascii_lowercase().as_str() {
            "bit" => SqlKind::Bit,
            "tinyint" => SqlKind::TinyInt,
            "smallint" => SqlKind::SmallInt,
            "int" => SqlKind::Int,
            "bigint" => SqlKind::BigInt,
            "real" => SqlKind::Real,
            "float" => SqlKind::Float,
            "decimal" | "numeric" => SqlKind::Decimal { scale },
            "money" | "smallmoney" => SqlKind::Decimal { scale: 4 },
            "binary" | "varbinary" | "image" => SqlKind::Binary,
            "uniqueidentifier" => SqlKind::Guid,
            "date" => SqlKind::Date,
            "time" => SqlKind::Time,
            "datetime2" => SqlKind::DateTime2,
            "datetime" => SqlKind::DateTime,
            "smalldatetime" => SqlKind::SmallDateTime,
            "datetimeoffset" => SqlKind::DateTimeOffset,
            _ => SqlKind::Text,
        }
    }

    fn null(self) -> ColumnData<'static> {
        match self {
            SqlKind::Bit => ColumnData::Bit(None),
            SqlKind::TinyInt => ColumnData::U8(None),
            SqlKind::SmallInt => ColumnData::I16(None),
            SqlKind::Int => ColumnData::I32(None),
            SqlKind::BigInt => ColumnData::I64(None),
            SqlKind::Real => ColumnData::F32(None),
            SqlKind::Float => ColumnData::F64(None),
            SqlKind::Decimal { .. } => ColumnData::Numeric(None),
            SqlKind::Text => ColumnData::String(None),
            SqlKind::Binary => ColumnData::Binary(None),
            SqlKind::Guid => ColumnData::Guid(None),
            SqlKind::Date => ColumnData::Date(None),
            SqlKind::Time => ColumnData::Time(None),
            SqlKind::DateTime2 => ColumnData::DateTime2(None),
            SqlKind::DateTime => ColumnData::DateTime(None),
            SqlKind::SmallDateTime => ColumnData::SmallDateTime(None),
            SqlKind::DateTimeOffset => ColumnData::DateTimeOffset(None),
        }
    }
}

fn mismatch(value: &Value, kind: SqlKind) -> FerryError {
    FerryError::Driver(format!("cannot bulk-load {:?} into a {:?} column", value, kind))
}

/// Coerce a value into the exact column data a bulk-load column expects
pub(crate) fn value_to_column_data(value: &Value, kind: SqlKind) -> Result<ColumnData<'static>> {
    if value.is_null() {
        return Ok(kind.null());
    }

    let data = match kind {
        SqlKind::Bit => ColumnData::Bit(Some(match value {
            Value::Bool(b) => *b,
            other => other.as_i64().ok_or_else(|| mismatch(value, kind))? != 0,
        })),
        SqlKind::TinyInt => ColumnData::U8(Some(
            integer(value)
                .and_then(|i| u8::try_from(i).ok())
                .ok_or_else(|| mismatch(value, kind))?,
        )),
        SqlKind::SmallInt => ColumnData::I16(Some(
            integer(value)
                .and_then(|i| i16::try_from(i).ok())
                .ok_or_else(|| mismatch(value, kind))?,
        )),
        SqlKind::Int => ColumnData::I32(Some(
            integer(value)
                .and_then(|i| i32::try_from(i).ok())
                .ok_or_else(|| mismatch(value, kind))?,
        )),
        SqlKind::BigInt => ColumnData::I64(Some(integer(value).ok_or_else(|| mismatch(value, kind))?)),
        SqlKind::Real => ColumnData::F32(Some(float(value).ok_or_else(|| mismatch(value, kind))? as f32)),
        SqlKind::Float => ColumnData::F64(Some(float(value).ok_or_else(|| mismatch(value, kind))?)),
        SqlKind::Decimal { scale } => {
            let text = match value {
                Value::Decimal(s) | Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let raw = parse_scaled(&text, scale).ok_or_else(|| mismatch(value, kind))?;
            ColumnData::Numeric(Some(Numeric::new_with_scale(raw, scale)))
        }
        SqlKind::Text => ColumnData::String(Some(Cow::Owned(match value.to_json() {
            serde_json::Value::String(s) => s,
            json => json.to_string(),
        }))),
        SqlKind::Binary => match value {
            Value::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.clone()))),
            Value::String(s) => ColumnData::Binary(Some(Cow::Owned(s.clone().into_bytes()))),
            _ => return Err(mismatch(value, kind)),
        },
        SqlKind::Guid => match value {
            Value::Uuid(u) => ColumnData::Guid(Some(*u)),
            Value::String(s) => {
                ColumnData::Guid(Some(uuid::Uuid::parse_str(s).map_err(|_| mismatch(value, kind))?))
            }
            _ => return Err(mismatch(value, kind)),
        },
        SqlKind::Date => match value {
            Value::Date(d) => d.into_sql(),
            _ => timestamp(value).ok_or_else(|| mismatch(value, kind))?.date().into_sql(),
        },
        SqlKind::Time => match value {
            Value::Time(t) => t.into_sql(),
            _ => timestamp(value).ok_or_else(|| mismatch(value, kind))?.time().into_sql(),
        },
        SqlKind::DateTime2 => timestamp(value).ok_or_else(|| mismatch(value, kind))?.into_sql(),
        SqlKind::DateTimeOffset => {
            let ts = timestamp(value).ok_or_else(|| mismatch(value, kind))?;
            ts.and_utc().into_sql()
        }
        SqlKind::DateTime => {
            let ts = timestamp(value).ok_or_else(|| mismatch(value, kind))?;
            let (days, secs) = since_1900(ts).ok_or_else(|| mismatch(value, kind))?;
            let fragments = (secs as f64 * 300.0
                + f64::from(ts.nanosecond()) * 300.0 / 1_000_000_000.0)
                .round() as u32;
            ColumnData::DateTime(Some(tiberius::time::DateTime::new(days, fragments)))
        }
        SqlKind::SmallDateTime => {
            let ts = timestamp(value).ok_or_else(|| mismatch(value, kind))?;
            let (days, secs) = since_1900(ts).ok_or_else(|| mismatch(value, kind))?;
            let days = u16::try_from(days).map_err(|_| mismatch(value, kind))?;
            ColumnData::SmallDateTime(Some(tiberius::time::SmallDateTime::new(days, (secs / 60) as u16)))
        }
    };
    Ok(data)
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float32(_) | Value::Float64(_) | Value::Decimal(_) => {
            float(value).filter(|f| f.fract() == 0.0).map(|f| f as i64)
        }
        other => other.as_i64(),
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Int8(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
            value.as_i64().map(|i| i as f64)
        }
        other => other.as_f64(),
    }
}

fn timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::DateTimeUtc(dt) => Some(dt.naive_utc()),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok(),
        _ => None,
    }
}

/// Days and whole seconds since 1900-01-01
fn since_1900(ts: NaiveDateTime) -> Option<(i32, u32)> {
    let base = NaiveDate::from_ymd_opt(1900, 1, 1)?;
    let days = i32::try_from((ts.date() - base).num_days()).ok()?;
    Some((days, ts.time().num_seconds_from_midnight()))
}

/// Parse decimal text into an integer scaled by `10^scale`, truncating extra digits
pub(crate) fn parse_scaled(text: &str, scale: u8) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let mut raw: i128 = 0;
    for c in int_part.chars() {
        raw = raw.checked_mul(10)?.checked_add(i128::from(c.to_digit(10)?))?;
    }
    let mut frac = frac_part.chars();
    for _ in 0..scale {
        let digit = frac.next().and_then(|c| c.to_digit(10)).unwrap_or(0);
        raw = raw.checked_mul(10)?.checked_add(i128::from(digit))?;
    }
    Some(if negative { -raw } else { raw })
}

#[cfg(test)]
mod tests;
