//! Conversions between ferry values and PostgreSQL wire values

use bytes::{BufMut, BytesMut};
use ferry_core::Value;
use tokio_postgres::Row as PgRow;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" (detail: {})", detail));
    }

    if let Some(column) = db_error.column().filter(|c| !c.trim().is_empty()) {
        message.push_str(&format!(" (column: {})", column));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        "42P01" => format!("relation does not exist: {}", message),
        _ => format!("{} (code: {:?})", message, code),
    }
}

/// Owned parameter value that can be written for any target column type.
#[derive(Debug)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Numeric(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
}

impl PgValue {
    /// Convert a value into the representation the target column expects so
    /// the binary encoding has the right width and format.
    pub(crate) fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        if value.is_null() {
            return PgValue::Null;
        }

        match *target_type {
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                return match value.to_json() {
                    serde_json::Value::String(s) => PgValue::String(s),
                    json => PgValue::String(json.to_string()),
                };
            }
            Type::NUMERIC => {
                return match value {
                    Value::Decimal(v) | Value::String(v) => PgValue::Numeric(v.clone()),
                    Value::Float32(v) => PgValue::Numeric(v.to_string()),
                    Value::Float64(v) => PgValue::Numeric(v.to_string()),
                    other => other
                        .as_i64()
                        .map(|v| PgValue::Numeric(v.to_string()))
                        .unwrap_or_else(|| PgValue::from_value(other)),
                };
            }
            Type::JSON | Type::JSONB => {
                return match value {
                    Value::Json(v) => PgValue::Json(v.clone()),
                    Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                        .map(PgValue::Json)
                        .unwrap_or_else(|_| PgValue::Json(serde_json::Value::String(s.clone()))),
                    other => PgValue::Json(other.to_json()),
                };
            }
            _ => {}
        }

        match value {
            Value::Int8(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int16(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),
            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                _ => PgValue::Float64(*v),
            },
            Value::DateTime(v) if *target_type == Type::TIMESTAMPTZ => {
                PgValue::DateTimeUtc(v.and_utc())
            }
            Value::DateTimeUtc(v) if *target_type == Type::TIMESTAMP => {
                PgValue::DateTime(v.naive_utc())
            }
            Value::String(v) => Self::coerce_string(v, target_type),
            other => PgValue::from_value(other),
        }
    }

    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => PgValue::Int16(value as i16),
            Type::INT4 => PgValue::Int32(value as i32),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            _ => PgValue::Int64(value),
        }
    }

    fn coerce_string(value: &str, target_type: &Type) -> Self {
        let parsed = match *target_type {
            Type::DATE => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(PgValue::Date),
            Type::TIMESTAMP => parse_naive_datetime(value).map(PgValue::DateTime),
            Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|ts| ts.with_timezone(&chrono::Utc))
                .or_else(|| parse_naive_datetime(value).map(|ts| ts.and_utc()))
                .map(PgValue::DateTimeUtc),
            Type::UUID => uuid::Uuid::parse_str(value).ok().map(PgValue::Uuid),
            Type::INT2 | Type::INT4 | Type::INT8 => value
                .trim()
                .parse::<i64>()
                .ok()
                .map(|v| Self::coerce_int(v, target_type)),
            Type::BOOL => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(PgValue::Bool(true)),
                "false" | "f" | "0" => Some(PgValue::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        parsed.unwrap_or_else(|| PgValue::String(value.to_string()))
    }

    /// Used when the target type is unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int8(v) => PgValue::Int16(*v as i16),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::Numeric(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(_) => PgValue::Json(value.to_json()),
        }
    }
}

fn parse_naive_datetime(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Numeric(v) => {
                encode_numeric(v, out)?;
                Ok(IsNull::No)
            }
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// Write a decimal string in the NUMERIC binary format
/// (ndigits, weight, sign, dscale, then base-10000 digit groups).
pub(crate) fn encode_numeric(text: &str, out: &mut BytesMut) -> std::result::Result<(), BoxError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_NAN);
        out.put_i16(0);
        return Ok(());
    }

    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (NUMERIC_NEG, rest),
        None => (NUMERIC_POS, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(format!("invalid numeric literal '{}'", text).into());
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = frac_part.len() as i16;

    // Left-pad the integer part and right-pad the fraction to whole groups of 4.
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let digits_text = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_part,
        frac_part,
        "0".repeat(frac_pad)
    );

    let mut groups: Vec<i16> = digits_text
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |acc, digit| acc * 10 + (digit - b'0') as i16)
        })
        .collect();

    let int_groups = (int_pad + int_part.len()) / 4;
    let mut weight = int_groups as i16 - 1;

    // Strip leading zero groups (shifting the weight) and trailing zero groups.
    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= leading as i16;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    let sign = if groups.is_empty() { NUMERIC_POS } else { sign };
    if groups.is_empty() {
        weight = 0;
    }

    out.put_i16(groups.len() as i16);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_i16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}

/// NUMERIC decoded to its exact decimal text
#[derive(Debug)]
pub(crate) struct PgNumericString(pub(crate) String);

impl PgNumericString {
    fn parse(raw: &[u8]) -> std::result::Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }
        if sign == NUMERIC_NAN {
            return Ok("NaN".to_string());
        }

        let digits: Vec<u16> = (0..ndigits)
            .map(|index| {
                let offset = 8 + index * 2;
                u16::from_be_bytes([raw[offset], raw[offset + 1]])
            })
            .collect();
        if digits.is_empty() {
            return Ok("0".to_string());
        }

        // Position of each group relative to the decimal point: group i has
        // exponent (weight - i) in base 10000.
        let mut integer_text = String::new();
        for exponent in (0..=weight.max(-1)).rev() {
            let index = (weight - exponent) as usize;
            let group = digits.get(index).copied().unwrap_or(0);
            if integer_text.is_empty() {
                integer_text.push_str(&group.to_string());
            } else {
                integer_text.push_str(&format!("{group:04}"));
            }
        }
        if integer_text.is_empty() {
            integer_text.push('0');
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            let mut exponent = -1i32;
            while fraction_text.len() < dscale {
                let index = weight as i32 - exponent;
                let group = if index >= 0 {
                    digits.get(index as usize).copied().unwrap_or(0)
                } else {
                    0
                };
                fraction_text.push_str(&format!("{group:04}"));
                exponent -= 1;
            }
            fraction_text.truncate(dscale);
        }

        let mut output = String::new();
        if sign == NUMERIC_NEG {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }
        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw UTF-8 payload, used for enums and other custom types
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let Some(col) = row.columns().get(idx) else {
        return Value::Null;
    };

    let value = match col.type_().name() {
        "bool" => get::<bool>(row, idx).map(Value::Bool),
        "int2" => get::<i16>(row, idx).map(Value::Int16),
        "int4" => get::<i32>(row, idx).map(Value::Int32),
        "int8" => get::<i64>(row, idx).map(Value::Int64),
        "float4" => get::<f32>(row, idx).map(Value::Float32),
        "float8" => get::<f64>(row, idx).map(Value::Float64),
        "text" | "varchar" | "char" | "bpchar" | "name" => get::<String>(row, idx).map(Value::String),
        "bytea" => get::<Vec<u8>>(row, idx).map(Value::Bytes),
        "uuid" => get::<uuid::Uuid>(row, idx).map(Value::Uuid),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx).map(Value::Json),
        "date" => get::<chrono::NaiveDate>(row, idx).map(Value::Date),
        "time" => get::<chrono::NaiveTime>(row, idx).map(Value::Time),
        "timestamp" => get::<chrono::NaiveDateTime>(row, idx).map(Value::DateTime),
        "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, idx).map(Value::DateTimeUtc),
        "numeric" => get::<PgNumericString>(row, idx).map(|v| Value::Decimal(v.0)),
        "_text" | "_varchar" | "_bpchar" => get::<Vec<String>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::String).collect())),
        "_int4" => get::<Vec<i32>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int32).collect())),
        "_int8" => get::<Vec<i64>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int64).collect())),
        _ => get::<PgFallbackString>(row, idx).map(|v| Value::String(v.0)),
    };

    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests;
