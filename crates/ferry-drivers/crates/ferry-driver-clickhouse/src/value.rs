//! JSON-format conversions for the ClickHouse HTTP interface

use ferry_core::{ColumnMeta, FerryError, Result, Row, Value};

/// Convert a JSON value to a ferry value without type information
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float64(f)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Json(json.clone()),
    }
}

/// Strip `Nullable(..)` and `LowCardinality(..)` wrappers
fn base_type(type_name: &str) -> &str {
    let mut current = type_name.trim();
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

/// Convert a JSON cell using the column's ClickHouse type
pub(crate) fn typed_json_to_value(json: &serde_json::Value, type_name: &str) -> Value {
    if json.is_null() {
        return Value::Null;
    }
    let base = base_type(type_name);
    let text = json.as_str();

    if base.starts_with("Int") || base.starts_with("UInt") {
        // 64-bit integers arrive quoted
        let parsed = match json {
            serde_json::Value::Number(n) => n.as_i64(),
            _ => text.and_then(|s| s.parse::<i64>().ok()),
        };
        return match parsed {
            Some(i) => Value::Int64(i),
            None => Value::Decimal(text.map(str::to_string).unwrap_or_else(|| json.to_string())),
        };
    }
    if base.starts_with("Float") {
        return match json {
            serde_json::Value::Number(n) => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
            _ => text.and_then(|s| s.parse::<f64>().ok()).map(Value::Float64).unwrap_or(Value::Null),
        };
    }
    if base.starts_with("Decimal") {
        return Value::Decimal(text.map(str::to_string).unwrap_or_else(|| json.to_string()));
    }
    if base == "Date" || base == "Date32" {
        if let Some(date) = text.and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) {
            return Value::Date(date);
        }
    }
    if base.starts_with("DateTime") {
        if let Some(dt) =
            text.and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
        {
            return Value::DateTime(dt);
        }
    }
    if base == "UUID" {
        if let Some(uuid) = text.and_then(|s| uuid::Uuid::parse_str(s).ok()) {
            return Value::Uuid(uuid);
        }
    }
    json_to_value(json)
}

/// Parse a `JSONCompactEachRowWithNamesAndTypes` body.
///
/// The first two lines carry names and types, so empty results keep their
/// shape.
pub(crate) fn parse_compact_body(body: &str) -> Result<(Vec<ColumnMeta>, Vec<Row>)> {
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());

    let (Some(names_line), Some(types_line)) = (lines.next(), lines.next()) else {
        return Ok((Vec::new(), Vec::new()));
    };
    let names: Vec<String> = serde_json::from_str(names_line)?;
    let types: Vec<String> = serde_json::from_str(types_line)?;
    if names.len() != types.len() {
        return Err(FerryError::Driver(format!(
            "ClickHouse returned {} names but {} types",
            names.len(),
            types.len()
        )));
    }

    let columns: Vec<ColumnMeta> = names
        .iter()
        .zip(&types)
        .enumerate()
        .map(|(idx, (name, type_name))| ColumnMeta {
            name: name.clone(),
            data_type: type_name.clone(),
            nullable: type_name.starts_with("Nullable("),
            ordinal: idx,
            max_length: fixed_string_length(type_name),
        })
        .collect();

    let rows = lines
        .map(|line| {
            let cells: Vec<serde_json::Value> = serde_json::from_str(line)?;
            let values = cells
                .iter()
                .zip(&types)
                .map(|(cell, type_name)| typed_json_to_value(cell, type_name))
                .collect();
            Ok(Row::new(names.clone(), values))
        })
        .collect::<Result<Vec<Row>>>()?;

    Ok((columns, rows))
}

fn fixed_string_length(type_name: &str) -> Option<i64> {
    base_type(type_name)
        .strip_prefix("FixedString(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|len| len.parse().ok())
}

/// Render a value as a SQL literal
pub(crate) fn value_to_clickhouse_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int8(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => value.to_string(),
        Value::Float32(v) if v.is_finite() => v.to_string(),
        Value::Float64(v) if v.is_finite() => v.to_string(),
        Value::Float32(_) | Value::Float64(_) => "NULL".to_string(),
        other => match other.to_json() {
            serde_json::Value::String(s) => quote_string(&s),
            json => quote_string(&json.to_string()),
        },
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Substitute `?` placeholders with literals, leaving quoted text untouched
pub(crate) fn bind_literals(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len());
    let mut params = params.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in sql.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                out.push(ch);
            }
            '?' => match params.next() {
                Some(param) => out.push_str(&value_to_clickhouse_literal(param)),
                None => out.push(ch),
            },
            _ => out.push(ch),
        }
    }
    out
}

/// The client treats `?` as a bind marker; literal ones are doubled
pub(crate) fn escape_bind_markers(sql: &str) -> String {
    sql.replace('?', "??")
}

/// One `JSONEachRow` line per row
pub(crate) fn json_each_row(columns: &[String], rows: &[Vec<Value>]) -> String {
    let mut body = String::new();
    for row in rows {
        let object: serde_json::Map<String, serde_json::Value> = columns
            .iter()
            .zip(row)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        body.push_str(&serde_json::Value::Object(object).to_string());
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests;
