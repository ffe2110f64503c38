//! Writing pages to destinations

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ferry_core::{DataTable, Destination, Extraction, FerryError, Result, Value};
use ferry_exchange::ExchangeDialect;
use futures::StreamExt;
use futures::stream;

use crate::context::{Page, PageReceiver, RunContext};
use crate::error::Stage;
use crate::retry::retry_with_backoff;
use crate::strategy::LoadStrategy;

/// Drains pages until the producer hangs up or the run is cancelled
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume(&self, pages: PageReceiver, ctx: Arc<RunContext>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerKind {
    Database,
    Csv,
}

impl ConsumerKind {
    pub fn build(self) -> Arc<dyn Consumer> {
        match self {
            ConsumerKind::Database => Arc::new(DatabaseConsumer::new()),
            ConsumerKind::Csv => Arc::new(CsvConsumer::new()),
        }
    }
}

/// One attempt at writing a page somewhere
#[async_trait]
trait PageWriter: Send + Sync {
    async fn write(&self, ctx: &RunContext, page: &Page, attempt: u32) -> Result<u64>;
}

/// Receive pages in batches and write each batch with bounded parallelism.
///
/// A page that still fails after retrying is recorded against its
/// extraction; the rest of the batch carries on.
async fn drain(writer: &dyn PageWriter, mut pages: PageReceiver, ctx: &RunContext) -> Result<()> {
    let batch_size = ctx.config.consumer_batch_size.max(1);
    let parallelism = ctx.config.max_parallelism.max(1);
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        let received = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                tracing::info!("consumer stopping on cancellation");
                return Ok(());
            }
            received = pages.recv_many(&mut batch, batch_size) => received,
        };
        if received == 0 {
            break;
        }

        stream::iter(batch.drain(..))
            .for_each_concurrent(parallelism, |page| async move {
                let outcome = retry_with_backoff(&ctx.retry_policy(), &ctx.token, |attempt| {
                    writer.write(ctx, &page, attempt)
                })
                .await;
                match outcome {
                    Ok(written) => tracing::debug!(
                        extraction_id = page.extraction.id,
                        rows = written.value,
                        attempts = written.attempts,
                        "page written"
                    ),
                    Err(failure) => ctx.record_error(&page.extraction, Stage::Consumer, &failure.error),
                }
            })
            .await;
    }
    Ok(())
}

/// Loads pages into destination databases, by bulk copy or merge.
///
/// Once every page is written, rows inside each merged incremental window
/// that this run did not stamp are deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseConsumer;

impl DatabaseConsumer {
    pub fn new() -> Self {
        Self
    }
}

fn destination_of(extraction: &Extraction) -> Result<&Destination> {
    extraction.destination.as_ref().ok_or_else(|| {
        FerryError::Configuration(format!("extraction '{}' has no destination", extraction.name))
    })
}

/// Incremental window of one destination table merged this run
#[derive(Debug, Clone)]
struct MergedWindow {
    extraction: Arc<Extraction>,
    virtual_ids: Vec<Value>,
}

/// Writer for one run of the database consumer
#[derive(Debug, Default)]
struct DatabaseWriter {
    /// Keyed by destination table
    merged: DashMap<String, MergedWindow>,
}

impl DatabaseWriter {
    fn record_merge(&self, key: &str, page: &Page) {
        let extraction = &page.extraction;
        if !(page.table.page.partitioned && extraction.is_incremental && extraction.filter_column.is_some()) {
            return;
        }
        let mut window = self.merged.entry(key.to_string()).or_insert_with(|| MergedWindow {
            extraction: Arc::clone(extraction),
            virtual_ids: Vec::new(),
        });
        if let Some(group) = extraction.virtual_column() {
            for id in page.table.distinct_values(group) {
                if !window.virtual_ids.contains(&id) {
                    window.virtual_ids.push(id);
                }
            }
        }
    }

    /// Delete stale rows once per merged window. A window whose extraction
    /// failed anywhere in the run is left alone: its pages are incomplete.
    async fn delete_stale(&self, ctx: &RunContext) {
        if ctx.token.is_cancelled() {
            return;
        }
        let windows: Vec<(String, MergedWindow)> = self
            .merged
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (key, window) in windows {
            let extraction = window.extraction.as_ref();
            if ctx.errors.has_failed(extraction.id) {
                tracing::warn!(table = %key, extraction_id = extraction.id, "skipping stale-row delete");
                continue;
            }
            let outcome = retry_with_backoff(&ctx.retry_policy(), &ctx.token, |_| delete_window(ctx, &window)).await;
            if let Err(failure) = outcome {
                ctx.record_error(extraction, Stage::Consumer, &failure.error);
            }
        }
    }
}

async fn delete_window(ctx: &RunContext, window: &MergedWindow) -> Result<u64> {
    let extraction = window.extraction.as_ref();
    let destination = destination_of(extraction)?;
    let conn = ctx
        .acquire(destination.dialect, &destination.connection_string)
        .await?;
    let deleted = ctx
        .exchange(destination.dialect)
        .delete_stale(extraction, ctx.request_time, ctx.loaded_at, &window.virtual_ids, &*conn)
        .await;
    conn.release().await;
    deleted
}

#[async_trait]
impl PageWriter for DatabaseWriter {
    async fn write(&self, ctx: &RunContext, page: &Page, attempt: u32) -> Result<u64> {
        let extraction = page.extraction.as_ref();
        let destination = destination_of(extraction)?;
        let exchange = ctx.exchange(destination.dialect);
        let key = extraction.destination_key();
        let strategy = ctx
            .strategies
            .resolve(&key, LoadStrategy::initial_for(&page.table.page));

        let conn = ctx
            .acquire(destination.dialect, &destination.connection_string)
            .await?;
        let outcome = async {
            if !ctx.ensured.contains(&key) {
                exchange.create_table(&page.table, extraction, &*conn).await?;
                ctx.ensured.insert(key.clone());
            }
            match strategy {
                LoadStrategy::Bulk => exchange.bulk_load(&page.table, extraction, &*conn).await,
                LoadStrategy::Merge => {
                    let staged = exchange
                        .merge_load(&page.table, extraction, ctx.loaded_at, &*conn)
                        .await?;
                    self.record_merge(&key, page);
                    Ok(staged)
                }
            }
        }
        .await;
        conn.release().await;

        if let Err(error) = &outcome {
            if strategy == LoadStrategy::Bulk
                && error.is_retryable()
                && attempt < ctx.retry_policy().max_attempts()
            {
                ctx.strategies.downgrade(&key);
            }
        }
        outcome
    }
}

#[async_trait]
impl Consumer for DatabaseConsumer {
    async fn consume(&self, pages: PageReceiver, ctx: Arc<RunContext>) -> Result<()> {
        let writer = DatabaseWriter::default();
        drain(&writer, pages, &ctx).await?;
        writer.delete_stale(&ctx).await;
        Ok(())
    }
}

/// Appends pages to hourly CSV files, one per destination table
#[derive(Debug, Default)]
pub struct CsvConsumer {
    /// Serialises writers appending to the same file
    locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

impl CsvConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{table alias}_{yyyyMMddHH}.csv` under the output directory
    pub fn file_path(ctx: &RunContext, table_alias: &str) -> PathBuf {
        ctx.config.csv_output_dir.join(format!(
            "{}_{}.csv",
            table_alias,
            ctx.request_time.format("%Y%m%d%H")
        ))
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.entry(path.to_path_buf()).or_default().value())
    }
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bytes(_) | Value::Array(_) => match value.to_json() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        },
        other => other.to_string(),
    }
}

/// Append `table` to `path`, writing the header only into a new or empty file
fn append_csv(path: &Path, table: &DataTable) -> Result<u64> {
    let has_content = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    if !has_content {
        writer
            .write_record(table.column_names())
            .map_err(|e| FerryError::Io(e.into()))?;
    }
    for row in &table.rows {
        writer
            .write_record(row.iter().map(csv_field))
            .map_err(|e| FerryError::Io(e.into()))?;
    }
    writer.flush()?;
    Ok(table.row_count() as u64)
}

#[async_trait]
impl PageWriter for CsvConsumer {
    async fn write(&self, ctx: &RunContext, page: &Page, _attempt: u32) -> Result<u64> {
        let path = Self::file_path(ctx, page.extraction.table_alias());
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&ctx.config.csv_output_dir).await?;
        let table = page.table.clone();
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || append_csv(&target, &table))
            .await
            .map_err(|e| FerryError::Other(format!("csv writer task failed: {}", e)))??;

        tracing::debug!(file = %path.display(), rows = written, "csv page appended");
        Ok(written)
    }
}

#[async_trait]
impl Consumer for CsvConsumer {
    async fn consume(&self, pages: PageReceiver, ctx: Arc<RunContext>) -> Result<()> {
        drain(self, pages, &ctx).await
    }
}
