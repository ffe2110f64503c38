use std::time::Duration;

use ferry_core::{ColumnFilter, DialectKind, FerryError, Value};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::dialect::{ExchangeDialect, SelectRequest};
use crate::engines::MySqlExchange;
use crate::testing::{RecordingConnection, at, orders_extraction, query_result};

fn three_columns() -> ferry_core::QueryResult {
    query_result(
        &["id", "status", "blob"],
        vec![
            vec![Value::Int64(9), Value::String("open".into()), Value::Bytes(vec![1, 2])],
            vec![Value::Int64(8), Value::Null, Value::Bytes(vec![3])],
        ],
    )
}

#[tokio::test]
async fn test_select_data_builds_page() {
    let conn = RecordingConnection::new(DialectKind::MySql);
    conn.respond("SELECT", three_columns());
    let extraction = orders_extraction(DialectKind::MySql)
        .with_column_filter(ColumnFilter::Ignore(vec!["BLOB".into()]));
    let request = SelectRequest::new(0, 2, at(12, 0)).partitioned(true);

    let table = MySqlExchange::default()
        .select_data(&extraction, &request, &conn, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(table.name, "orders");
    assert_eq!(table.column_names(), vec!["id", "status"]);
    assert_eq!(table.row_count(), 2);
    assert!(table.page.is_first);
    assert!(!table.page.is_last);
    assert!(table.page.partitioned);
}

#[tokio::test]
async fn test_short_page_is_last() {
    let conn = RecordingConnection::new(DialectKind::MySql);
    conn.respond("SELECT", three_columns());
    let request = SelectRequest::new(300, 100, at(12, 0));

    let table = MySqlExchange::default()
        .select_data(&orders_extraction(DialectKind::MySql), &request, &conn, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!table.page.is_first);
    assert!(table.page.is_last);
    assert!(!table.page.partitioned);
}

#[tokio::test]
async fn test_cancelled_before_fetch_runs_nothing() {
    let conn = RecordingConnection::new(DialectKind::MySql);
    let token = CancellationToken::new();
    token.cancel();

    let result = MySqlExchange::default()
        .select_data(
            &orders_extraction(DialectKind::MySql),
            &SelectRequest::new(0, 10, at(12, 0)),
            &conn,
            &token,
        )
        .await;

    assert!(matches!(result, Err(FerryError::Cancelled)));
    assert!(conn.statements().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_running_fetch() {
    let conn = RecordingConnection::new(DialectKind::MySql);
    conn.hang();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = MySqlExchange::default()
        .select_data(
            &orders_extraction(DialectKind::MySql),
            &SelectRequest::new(0, 10, at(12, 0)),
            &conn,
            &token,
        )
        .await;

    assert!(matches!(result, Err(FerryError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_bounded_by_command_timeout() {
    let conn = RecordingConnection::new(DialectKind::MySql);
    conn.hang();
    let engine = MySqlExchange::new(
        crate::ExchangeOptions::default().with_command_timeout(Duration::from_secs(2)),
    );

    let result = engine
        .select_data(
            &orders_extraction(DialectKind::MySql),
            &SelectRequest::new(0, 10, at(12, 0)),
            &conn,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(FerryError::Timeout(_))));
}
