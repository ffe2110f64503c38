//! Bulk load through the TDS `INSERT BULK` path

use tiberius::{Client, ToSql, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;

use ferry_core::{FerryError, Result, Value};

use crate::value::{SqlKind, value_to_column_data};

/// A destination column tiberius will expect in every bulk row
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BulkColumn {
    pub name: String,
    pub kind: SqlKind,
    /// Position of this column in the caller's row, if supplied
    pub source: Option<usize>,
}

/// Catalog query resolving a table's writable columns in physical order.
///
/// Temporary tables live in tempdb and need their catalog views from there.
pub(crate) fn layout_query(table: &str) -> (String, String) {
    let is_temp = table.trim_start_matches('[').starts_with('#');
    let (catalog, object) = if is_temp {
        ("tempdb.", format!("tempdb..{}", table))
    } else {
        ("", table.to_string())
    };
    let sql = format!(
        "SELECT c.name, t.name AS type_name, CAST(c.scale AS INT) AS scale \
         FROM {catalog}sys.columns c \
         JOIN {catalog}sys.types t ON c.user_type_id = t.user_type_id \
         WHERE c.object_id = OBJECT_ID(@P1) \
           AND c.is_identity = 0 AND c.is_computed = 0 AND t.name <> 'timestamp' \
         ORDER BY c.column_id",
        catalog = catalog
    );
    (sql, object)
}

/// Match the caller's columns to the table layout by name (case-insensitive)
pub(crate) fn plan_layout(table_columns: Vec<(String, String, u8)>, columns: &[String]) -> Vec<BulkColumn> {
    table_columns
        .into_iter()
        .map(|(name, type_name, scale)| {
            let source = columns.iter().position(|c| c.eq_ignore_ascii_case(&name));
            BulkColumn {
                kind: SqlKind::from_type_name(&type_name, scale),
                name,
                source,
            }
        })
        .collect()
}

pub(crate) fn build_row(layout: &[BulkColumn], row: &[Value]) -> Result<TokenRow<'static>> {
    let mut token = TokenRow::new();
    for column in layout {
        let value = column
            .source
            .and_then(|idx| row.get(idx))
            .unwrap_or(&Value::Null);
        let data = value_to_column_data(value, column.kind)
            .map_err(|e| FerryError::Driver(format!("column {}: {}", column.name, e)))?;
        token.push(data);
    }
    Ok(token)
}

pub(crate) async fn bulk_load(
    client: &mut Client<Compat<TcpStream>>,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<u64> {
    let (sql, object) = layout_query(table);
    let catalog_rows = client
        .query(sql, &[&object as &dyn ToSql])
        .await
        .map_err(|e| FerryError::Driver(e.to_string()))?
        .into_first_result()
        .await
        .map_err(|e| FerryError::Driver(e.to_string()))?;

    let table_columns: Vec<(String, String, u8)> = catalog_rows
        .iter()
        .filter_map(|row| {
            let name: &str = row.get(0)?;
            let type_name: &str = row.get(1)?;
            let scale: i32 = row.get(2)?;
            Some((name.to_string(), type_name.to_string(), scale.clamp(0, 38) as u8))
        })
        .collect();
    if table_columns.is_empty() {
        return Err(FerryError::NotFound(format!("table {} has no writable columns", table)));
    }

    let layout = plan_layout(table_columns, columns);
    if let Some(missing) = columns
        .iter()
        .find(|c| !layout.iter().any(|l| l.name.eq_ignore_ascii_case(c)))
    {
        return Err(FerryError::Schema(format!("column {} does not exist in {}", missing, table)));
    }

    let mut request = client
        .bulk_insert(table)
        .await
        .map_err(|e| FerryError::Driver(format!("Failed to start bulk load into {}: {}", table, e)))?;
    for row in rows {
        request
            .send(build_row(&layout, row)?)
            .await
            .map_err(|e| FerryError::Driver(format!("Bulk load into {} failed: {}", table, e)))?;
    }
    let result = request
        .finalize()
        .await
        .map_err(|e| FerryError::Driver(format!("Bulk load into {} failed: {}", table, e)))?;

    Ok(result.total())
}
