//! Page fetches from source tables

use ferry_core::{ColumnFilter, Connection, DataTable, Extraction, FerryError, PageInfo, Result};
use tokio_util::sync::CancellationToken;

use crate::dialect::{ExchangeDialect, SelectRequest};
use crate::sql;

/// Build the page query for `extraction`.
///
/// Virtual dependencies are wrapped so the synthetic virtual-id column can be
/// filtered like any other column.
pub(crate) fn select_sql<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    extraction: &Extraction,
    request: &SelectRequest,
) -> Result<String> {
    let (source, hint) = match extraction.override_query.as_deref() {
        Some(query) => (format!("({}) src", query.trim().trim_end_matches(';')), ""),
        None => (
            format!("{} src", dialect.source_table(&extraction.name)),
            dialect.non_locking_hint(),
        ),
    };

    let projection = match &extraction.column_filter {
        ColumnFilter::Include(columns) if !columns.is_empty() => columns
            .iter()
            .map(|c| format!("src.{}", dialect.quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "src.*".to_string(),
    };

    let virtual_column = extraction.virtual_column();
    let mut sql = match (virtual_column, extraction.virtual_id.as_deref()) {
        (Some(group), Some(virtual_id)) => format!(
            "SELECT * FROM (SELECT {}, {} AS {} FROM {}{}) vsrc",
            projection,
            dialect.quote_string(virtual_id),
            dialect.quote_identifier(group),
            source,
            spaced(hint)
        ),
        _ => format!("SELECT {} FROM {}{}", projection, source, spaced(hint)),
    };

    if request.should_partition {
        let condition = dialect.partition_condition(
            extraction,
            request.request_time,
            virtual_column,
            request.override_filter_secs,
        )?;
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
    }

    // Newest rows first while partitioning
    let direction = if request.should_partition { "DESC" } else { "ASC" };
    sql.push_str(&format!(
        " ORDER BY {} {} {}",
        dialect.quote_identifier(&extraction.index_column),
        direction,
        dialect.pagination(request.offset, request.limit)
    ));
    Ok(sql)
}

fn spaced(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!(" {}", hint)
    }
}

pub(crate) async fn select_data<D: ExchangeDialect + ?Sized>(
    dialect: &D,
    extraction: &Extraction,
    request: &SelectRequest,
    conn: &dyn Connection,
    token: &CancellationToken,
) -> Result<DataTable> {
    if token.is_cancelled() {
        return Err(FerryError::Cancelled);
    }
    let sql = select_sql(dialect, extraction, request)?;

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(FerryError::Cancelled),
        result = sql::query(conn, &sql, dialect.options().command_timeout) => result?,
    };

    let mut table = DataTable::from_query_result(extraction.table_alias(), dialect.kind(), result);
    if let ColumnFilter::Ignore(columns) = &extraction.column_filter {
        table.drop_columns(columns);
    }
    table.page = PageInfo::for_fetch(request.offset, request.limit, table.row_count())
        .with_partitioned(request.should_partition);

    tracing::debug!(
        extraction_id = extraction.id,
        table = %extraction.table_alias(),
        offset = request.offset,
        rows = table.row_count(),
        "page fetched"
    );
    Ok(table)
}

#[cfg(test)]
mod tests;
