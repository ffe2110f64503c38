use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ferry_core::FerryError;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::*;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 100, 1_000)
}

/// Fails with a query error until `succeed_on`
async fn flaky(calls: &AtomicU32, succeed_on: u32) -> ferry_core::Result<&'static str> {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call >= succeed_on {
        Ok("done")
    } else {
        Err(FerryError::Query(format!("failure {}", call)))
    }
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_on_last_allowed_attempt() {
    let calls = AtomicU32::new(0);
    let outcome = retry_with_backoff(&policy(3), &CancellationToken::new(), |_| flaky(&calls, 3))
        .await
        .unwrap();

    assert_eq!(outcome.value, "done");
    assert_eq!(outcome.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausting_attempts_stops() {
    let calls = AtomicU32::new(0);
    let failure = retry_with_backoff(&policy(3), &CancellationToken::new(), |_| flaky(&calls, 10))
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(failure.error, FerryError::Query(msg) if msg == "failure 3"));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles() {
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();
    retry_with_backoff(&policy(3), &CancellationToken::new(), |_| flaky(&calls, 3))
        .await
        .unwrap();

    // 100ms + 200ms
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test]
async fn test_structural_errors_are_not_retried() {
    let calls = AtomicU32::new(0);
    let failure = retry_with_backoff(&policy(5), &CancellationToken::new(), |_| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(FerryError::MissingTemplate("orders".into()))
    })
    .await
    .unwrap_err();

    assert_eq!(failure.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_attempt_numbers_are_one_based() {
    let seen = parking_lot::Mutex::new(Vec::new());
    let _ = retry_with_backoff(&RetryPolicy::new(3, 1, 1), &CancellationToken::new(), |attempt| {
        seen.lock().push(attempt);
        async { Err::<(), _>(FerryError::Timeout("slow".into())) }
    })
    .await;

    assert_eq!(*seen.lock(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_aborts() {
    let calls = AtomicU32::new(0);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let failure = retry_with_backoff(&RetryPolicy::new(5, 10_000, 10_000), &token, |_| flaky(&calls, 10))
        .await
        .unwrap_err();

    assert!(failure.error.is_cancelled());
    assert_eq!(failure.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_token_runs_nothing() {
    let calls = AtomicU32::new(0);
    let token = CancellationToken::new();
    token.cancel();

    let failure = retry_with_backoff(&policy(3), &token, |_| flaky(&calls, 1))
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
