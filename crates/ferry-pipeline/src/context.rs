//! Per-run state shared by the producer and consumer

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDateTime, Timelike, Utc};
use dashmap::DashSet;
use ferry_connection::{PoolKey, PoolRegistry, PooledConnection};
use ferry_core::{DataTable, DialectKind, Extraction, FerryError, Result};
use ferry_exchange::DbExchange;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::{ErrorCollector, Stage};
use crate::retry::RetryPolicy;
use crate::strategy::LoadStrategies;
use crate::telemetry::JobTelemetry;

/// One fetched page and the extraction it belongs to
#[derive(Debug, Clone)]
pub struct Page {
    pub table: DataTable,
    pub extraction: Arc<Extraction>,
}

impl Page {
    pub fn new(table: DataTable, extraction: Arc<Extraction>) -> Self {
        Self { table, extraction }
    }
}

pub type PageSender = mpsc::UnboundedSender<Page>;
pub type PageReceiver = mpsc::UnboundedReceiver<Page>;

/// Everything a producer or consumer needs for one run
pub struct RunContext {
    pub config: Arc<PipelineConfig>,
    pub pools: Arc<PoolRegistry>,
    pub telemetry: Arc<dyn JobTelemetry>,
    pub errors: ErrorCollector,
    pub token: CancellationToken,
    /// Reference time for every incremental window in the run
    pub request_time: NaiveDateTime,
    /// Change-tracking stamp written by every merge of the run, in whole
    /// seconds so second-precision columns store it exactly
    pub loaded_at: NaiveDateTime,
    /// Probe destinations before reading, truncating full reloads
    pub preflight: bool,
    pub strategies: LoadStrategies,
    /// Destination tables already created this run
    pub ensured: DashSet<String>,
    touched: DashSet<PoolKey>,
    pages: AtomicU64,
    rows: AtomicU64,
    bytes: AtomicU64,
}

impl RunContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        pools: Arc<PoolRegistry>,
        telemetry: Arc<dyn JobTelemetry>,
        token: CancellationToken,
        request_time: NaiveDateTime,
        preflight: bool,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            config,
            pools,
            telemetry,
            errors: ErrorCollector::new(),
            token,
            request_time,
            loaded_at: now.with_nanosecond(0).unwrap_or(now),
            preflight,
            strategies: LoadStrategies::new(),
            ensured: DashSet::new(),
            touched: DashSet::new(),
            pages: AtomicU64::new(0),
            rows: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn exchange(&self, dialect: DialectKind) -> DbExchange {
        DbExchange::with_options(dialect, self.config.exchange_options())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }

    /// Borrow a pooled connection, giving up if the run is cancelled
    pub async fn acquire(&self, dialect: DialectKind, connection_string: &str) -> Result<PooledConnection> {
        let key = PoolKey::new(connection_string, dialect);
        if !self.touched.contains(&key) {
            self.touched.insert(key.clone());
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FerryError::Cancelled),
            conn = self.pools.acquire(&key) => conn,
        }
    }

    pub fn record_error(&self, extraction: &Extraction, stage: Stage, error: &FerryError) {
        self.errors.record(extraction, stage, error);
    }

    /// Report a fetched page and hand it to the consumer
    pub fn emit(&self, pages: &PageSender, page: Page) -> Result<()> {
        let bytes = page.table.estimated_bytes();
        self.telemetry.record_bytes(page.extraction.id, bytes);
        self.pages.fetch_add(1, Ordering::Relaxed);
        self.rows.fetch_add(page.table.row_count() as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);

        pages
            .send(page)
            .map_err(|_| FerryError::Other("consumer stopped receiving pages".into()))
    }

    pub fn pages_emitted(&self) -> u64 {
        self.pages.load(Ordering::Relaxed)
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn bytes_emitted(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Close every pool this run borrowed from
    pub async fn close_touched(&self) {
        let keys: Vec<PoolKey> = self.touched.iter().map(|key| key.key().clone()).collect();
        for key in keys {
            if self.pools.close_pool(&key).await {
                tracing::debug!(pool = %key, "closed pool after run");
            }
        }
        self.touched.clear();
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("request_time", &self.request_time)
            .field("loaded_at", &self.loaded_at)
            .field("preflight", &self.preflight)
            .field("pages", &self.pages_emitted())
            .field("errors", &self.errors.len())
            .finish()
    }
}
