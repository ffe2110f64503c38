//! Binary COPY bulk load

use std::sync::Arc;

use futures::pin_mut;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};

use ferry_core::{FerryError, Result, Value};

use crate::tls::PostgresDriverError;
use crate::value::{PgValue, format_postgres_error};

pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Stream `rows` into `table` with `COPY ... FROM STDIN (FORMAT binary)`.
///
/// Column types are read from the destination first so every value is
/// encoded in the exact binary form the server expects.
pub(crate) async fn copy_rows(
    client: &Arc<Mutex<Client>>,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<u64> {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let client = client.lock().await;

    let probe = client
        .prepare(&format!("SELECT {} FROM {} LIMIT 0", column_list, table))
        .await
        .map_err(|e| FerryError::Query(format_postgres_error(&e)))?;
    let types: Vec<Type> = probe.columns().iter().map(|c| c.type_().clone()).collect();

    let copy_error = |e: tokio_postgres::Error| -> FerryError {
        PostgresDriverError::Copy {
            table: table.to_string(),
            message: format_postgres_error(&e),
        }
        .into()
    };

    let sink = client
        .copy_in(&format!(
            "COPY {} ({}) FROM STDIN (FORMAT binary)",
            table, column_list
        ))
        .await
        .map_err(copy_error)?;

    let writer = BinaryCopyInWriter::new(sink, &types);
    pin_mut!(writer);

    for row in rows {
        let values: Vec<PgValue> = row
            .iter()
            .zip(types.iter())
            .map(|(value, ty)| PgValue::from_value_for_type(value, ty))
            .collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        writer.as_mut().write(&refs).await.map_err(copy_error)?;
    }

    let copied = writer.finish().await.map_err(copy_error)?;
    tracing::debug!(table = %table, rows = copied, "binary COPY finished");
    Ok(copied)
}
