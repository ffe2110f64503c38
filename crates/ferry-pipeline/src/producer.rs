//! Reading pages out of origins

use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{Connection, DataTable, Extraction, FerryError, Origin, Result, SourceType};
use ferry_exchange::{DbExchange, DependencyFetcher, ExchangeDialect, SelectRequest};
use futures::StreamExt;
use futures::stream;
use indexmap::IndexMap;

use crate::config::PipelineConfig;
use crate::context::{Page, PageSender, RunContext};
use crate::error::Stage;
use crate::http::{HttpExchange, ReqwestHttpExchange};
use crate::retry::retry_with_backoff;

/// Reads every extraction's pages and sends them to the consumer.
///
/// Failures are recorded per extraction on the context; `produce` itself
/// only fails when the run cannot continue at all.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(
        &self,
        extractions: Vec<Arc<Extraction>>,
        ctx: Arc<RunContext>,
        pages: PageSender,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    Db,
    Http,
}

impl From<SourceType> for ProducerKind {
    fn from(source: SourceType) -> Self {
        match source {
            SourceType::Db => ProducerKind::Db,
            SourceType::Http => ProducerKind::Http,
        }
    }
}

impl ProducerKind {
    pub fn build(self, config: &PipelineConfig) -> Result<Arc<dyn Producer>> {
        Ok(match self {
            ProducerKind::Db => Arc::new(DatabaseProducer::new()),
            ProducerKind::Http => Arc::new(HttpProducer::new(Arc::new(ReqwestHttpExchange::new(
                config.command_timeout(),
            )?))),
        })
    }
}

fn origin_of(extraction: &Extraction) -> Result<&Origin> {
    extraction.origin.as_ref().ok_or_else(|| {
        FerryError::Configuration(format!("extraction '{}' has no origin", extraction.name))
    })
}

/// Whether pages of `extraction` should be fetched through the incremental
/// window.
///
/// With preflight on, a missing destination table forces a full load and a
/// full reload truncates the destination first.
async fn should_partition(ctx: &RunContext, extraction: &Extraction) -> Result<bool> {
    let destination = match (&extraction.destination, ctx.preflight) {
        (Some(destination), true) => destination,
        _ => return Ok(extraction.is_incremental),
    };
    let exchange = ctx.exchange(destination.dialect);
    let exchange = &exchange;

    let outcome = retry_with_backoff(&ctx.retry_policy(), &ctx.token, |_| async move {
        let conn = ctx
            .acquire(destination.dialect, &destination.connection_string)
            .await?;
        let probed = probe_destination(exchange, extraction, &*conn).await;
        conn.release().await;
        probed
    })
    .await
    .map_err(|failure| failure.error)?;
    Ok(outcome.value)
}

async fn probe_destination(exchange: &DbExchange, extraction: &Extraction, conn: &dyn Connection) -> Result<bool> {
    if !exchange.exists(extraction, conn).await? {
        tracing::info!(
            extraction_id = extraction.id,
            table = %extraction.table_alias(),
            "destination missing, loading in full"
        );
        return Ok(false);
    }
    if !extraction.is_incremental {
        exchange.truncate(extraction, conn).await?;
        return Ok(false);
    }
    Ok(exchange.count_rows(extraction, conn).await? > 0)
}

/// Fetch one page of `extraction` from its origin, retrying transient failures
async fn select_page(ctx: &RunContext, extraction: &Extraction, request: &SelectRequest) -> Result<DataTable> {
    let origin = origin_of(extraction)?;
    let exchange = ctx.exchange(origin.dialect);
    let exchange = &exchange;

    retry_with_backoff(&ctx.retry_policy(), &ctx.token, |_| async move {
        let conn = ctx.acquire(origin.dialect, &origin.connection_string).await?;
        let fetched = exchange.select_data(extraction, request, &*conn, &ctx.token).await;
        conn.release().await;
        fetched
    })
    .await
    .map(|outcome| outcome.value)
    .map_err(|failure| failure.error)
}

enum Unit {
    Single(Arc<Extraction>),
    /// Dependencies sharing one destination table
    Virtual(Vec<Arc<Extraction>>),
}

impl Unit {
    fn members(&self) -> &[Arc<Extraction>] {
        match self {
            Unit::Single(extraction) => std::slice::from_ref(extraction),
            Unit::Virtual(dependencies) => dependencies,
        }
    }
}

/// Plain extractions in input order, then one unit per virtual table.
///
/// Virtual dependencies are grouped by destination and table alias only,
/// whatever origin they read from.
fn plan_units(extractions: Vec<Arc<Extraction>>) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut groups: IndexMap<String, Vec<Arc<Extraction>>> = IndexMap::new();
    for extraction in extractions {
        if extraction.is_virtual {
            groups
                .entry(extraction.virtual_group_key())
                .or_default()
                .push(extraction);
        } else {
            units.push(Unit::Single(extraction));
        }
    }
    units.extend(groups.into_values().map(Unit::Virtual));
    units
}

/// Pages database origins with `LIMIT/OFFSET`-style queries
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseProducer;

impl DatabaseProducer {
    pub fn new() -> Self {
        Self
    }

    async fn produce_single(&self, ctx: &RunContext, pages: &PageSender, extraction: &Arc<Extraction>) -> Result<()> {
        let partition = should_partition(ctx, extraction).await?;
        let mut request = SelectRequest::new(0, ctx.config.page_limit, ctx.request_time).partitioned(partition);

        loop {
            let table = select_page(ctx, extraction, &request).await?;
            if table.is_empty() {
                break;
            }
            let is_last = table.page.is_last;
            ctx.emit(pages, Page::new(table, Arc::clone(extraction)))?;
            if is_last {
                break;
            }
            request = request.next_page();
        }
        Ok(())
    }

    async fn produce_virtual(&self, ctx: &RunContext, pages: &PageSender, dependencies: &[Arc<Extraction>]) -> Result<()> {
        let template = dependencies
            .iter()
            .find(|d| d.is_virtual_template)
            .ok_or_else(|| {
                FerryError::MissingTemplate(
                    dependencies
                        .first()
                        .map(|d| d.table_alias().to_string())
                        .unwrap_or_default(),
                )
            })?;
        let exchange = ctx.exchange(origin_of(template)?.dialect);
        let partition = should_partition(ctx, template).await?;
        let mut request = SelectRequest::new(0, ctx.config.page_limit, ctx.request_time).partitioned(partition);

        loop {
            let fetcher = PooledFetcher { ctx, request: request.clone() };
            let table = exchange.parallel_select(dependencies, &fetcher).await?;
            if table.is_empty() {
                break;
            }
            let is_last = table.page.is_last;
            ctx.emit(pages, Page::new(table, Arc::clone(template)))?;
            if is_last {
                break;
            }
            request = request.next_page();
        }
        Ok(())
    }
}

/// Fetches each virtual dependency from its own origin's pool
struct PooledFetcher<'a> {
    ctx: &'a RunContext,
    request: SelectRequest,
}

#[async_trait]
impl DependencyFetcher for PooledFetcher<'_> {
    async fn fetch(&self, dependency: &Extraction) -> Result<DataTable> {
        select_page(self.ctx, dependency, &self.request).await
    }
}

#[async_trait]
impl Producer for DatabaseProducer {
    async fn produce(
        &self,
        extractions: Vec<Arc<Extraction>>,
        ctx: Arc<RunContext>,
        pages: PageSender,
    ) -> Result<()> {
        let units = plan_units(extractions);
        tracing::info!(units = units.len(), "database producer started");

        let ctx = ctx.as_ref();
        let pages = &pages;
        stream::iter(units)
            .for_each_concurrent(ctx.config.max_parallelism, |unit| async move {
                let outcome = match &unit {
                    Unit::Single(extraction) => self.produce_single(ctx, pages, extraction).await,
                    Unit::Virtual(dependencies) => self.produce_virtual(ctx, pages, dependencies).await,
                };
                if let Err(error) = outcome {
                    for extraction in unit.members() {
                        ctx.record_error(extraction, Stage::Producer, &error);
                    }
                }
            })
            .await;
        Ok(())
    }
}

/// Pages JSON APIs by page number
pub struct HttpProducer {
    exchange: Arc<dyn HttpExchange>,
}

impl HttpProducer {
    pub fn new(exchange: Arc<dyn HttpExchange>) -> Self {
        Self { exchange }
    }

    async fn produce_one(&self, ctx: &RunContext, pages: &PageSender, extraction: &Arc<Extraction>) -> Result<()> {
        let first_page = extraction
            .http
            .as_ref()
            .map(|http| http.first_page)
            .ok_or_else(|| {
                FerryError::Configuration(format!("extraction '{}' has no HTTP source", extraction.name))
            })?;
        // Preflight only to truncate full reloads; pages are never windowed
        should_partition(ctx, extraction).await?;

        let exchange = self.exchange.as_ref();
        let mut page = first_page;
        loop {
            let fetched = retry_with_backoff(&ctx.retry_policy(), &ctx.token, |_| {
                exchange.fetch_page(extraction, page, &ctx.token)
            })
            .await
            .map_err(|failure| failure.error)?
            .value;

            if fetched.table.is_empty() {
                break;
            }
            ctx.emit(pages, Page::new(fetched.table, Arc::clone(extraction)))?;
            if !fetched.has_more {
                break;
            }
            page += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Producer for HttpProducer {
    async fn produce(
        &self,
        extractions: Vec<Arc<Extraction>>,
        ctx: Arc<RunContext>,
        pages: PageSender,
    ) -> Result<()> {
        let ctx = ctx.as_ref();
        let pages = &pages;
        stream::iter(extractions)
            .for_each_concurrent(ctx.config.max_parallelism, |extraction| async move {
                if let Err(error) = self.produce_one(ctx, pages, &extraction).await {
                    ctx.record_error(&extraction, Stage::Producer, &error);
                }
            })
            .await;
        Ok(())
    }
}
