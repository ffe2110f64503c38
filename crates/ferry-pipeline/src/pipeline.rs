//! One producer/consumer run over a batch of extractions

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use ferry_connection::PoolRegistry;
use ferry_core::{Extraction, FerryError};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::consumer::Consumer;
use crate::context::RunContext;
use crate::error::PipelineError;
use crate::producer::Producer;
use crate::telemetry::JobTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    Completed,
    Failed,
}

/// Totals of a clean run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub pages: u64,
    pub rows: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Moves extractions from their origins to a sink.
///
/// Each [`run`](Self::run) spawns the producer and the consumer as separate
/// tasks joined by an unbounded channel. Per-extraction failures are
/// collected rather than aborting the run; they come back together in
/// [`PipelineError::Failed`].
pub struct ExtractionPipeline {
    config: Arc<PipelineConfig>,
    pools: Arc<PoolRegistry>,
    telemetry: Arc<dyn JobTelemetry>,
    state: parking_lot::Mutex<RunState>,
}

impl ExtractionPipeline {
    pub fn new(
        config: PipelineConfig,
        pools: Arc<PoolRegistry>,
        telemetry: Arc<dyn JobTelemetry>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            pools,
            telemetry,
            state: parking_lot::Mutex::new(RunState::Created),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    fn transition(&self, state: RunState) {
        let mut current = self.state.lock();
        tracing::info!(from = ?*current, to = ?state, "pipeline state changed");
        *current = state;
    }

    /// Run `extractions` through `producer` and `consumer`, stamping every
    /// incremental window with the current UTC time.
    pub async fn run(
        &self,
        extractions: Vec<Extraction>,
        producer: Arc<dyn Producer>,
        consumer: Arc<dyn Consumer>,
        preflight: bool,
        token: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        self.run_at(Utc::now().naive_utc(), extractions, producer, consumer, preflight, token)
            .await
    }

    /// [`run`](Self::run) with an explicit request time
    pub async fn run_at(
        &self,
        request_time: NaiveDateTime,
        extractions: Vec<Extraction>,
        producer: Arc<dyn Producer>,
        consumer: Arc<dyn Consumer>,
        preflight: bool,
        token: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let run_token = token.child_token();
        let ctx = Arc::new(RunContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.pools),
            Arc::clone(&self.telemetry),
            run_token.clone(),
            request_time,
            preflight,
        ));
        let extractions: Vec<Arc<Extraction>> = extractions.into_iter().map(Arc::new).collect();
        tracing::info!(
            extractions = extractions.len(),
            %request_time,
            preflight,
            "pipeline run starting"
        );
        self.transition(RunState::Running);

        let (pages_tx, pages_rx) = mpsc::unbounded_channel();

        let producer_task = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            let token = run_token.clone();
            async move {
                let outcome = producer.produce(extractions, ctx, pages_tx).await;
                if outcome.is_err() {
                    token.cancel();
                }
                outcome
            }
        });
        let consumer_task = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            let token = run_token.clone();
            async move {
                let outcome = consumer.consume(pages_rx, ctx).await;
                if outcome.is_err() {
                    token.cancel();
                }
                outcome
            }
        });

        let (produced, consumed) = tokio::join!(producer_task, consumer_task);
        ctx.close_touched().await;

        let failures: Vec<String> = [("producer", produced), ("consumer", consumed)]
            .into_iter()
            .filter_map(|(side, joined)| task_failure(side, joined))
            .collect();
        let errors = ctx.errors.take();

        let outcome = if token.is_cancelled() {
            Err(PipelineError::Cancelled { errors })
        } else if !failures.is_empty() {
            Err(PipelineError::Task {
                message: failures.join("; "),
                errors,
            })
        } else if !errors.is_empty() {
            Err(PipelineError::Failed(errors))
        } else {
            Ok(RunSummary {
                pages: ctx.pages_emitted(),
                rows: ctx.rows_emitted(),
                bytes: ctx.bytes_emitted(),
                elapsed: started.elapsed(),
            })
        };

        match &outcome {
            Ok(summary) => {
                tracing::info!(
                    pages = summary.pages,
                    rows = summary.rows,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "pipeline run completed"
                );
                self.transition(RunState::Completed);
            }
            Err(error) => {
                tracing::warn!(error = %error, failed = error.errors().len(), "pipeline run failed");
                self.transition(RunState::Failed);
            }
        }
        outcome
    }
}

fn task_failure(side: &str, joined: Result<ferry_core::Result<()>, JoinError>) -> Option<String> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(FerryError::Cancelled)) => None,
        Ok(Err(error)) => Some(format!("{} failed: {}", side, error)),
        Err(join) => Some(format!("{} task aborted: {}", side, join)),
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
