//! Ferry Pipeline - moves extractions from sources to destinations
//!
//! One [`ExtractionPipeline::run`] spins a [`Producer`] and a [`Consumer`]
//! connected by an unbounded channel of [`Page`]s:
//!
//! - [`DatabaseProducer`] / [`HttpProducer`] read pages from origins
//! - [`DatabaseConsumer`] / [`CsvConsumer`] write them out
//!
//! Failures are retried with exponential backoff and collected per
//! extraction; one extraction failing never stops the others.

mod config;
mod consumer;
mod context;
mod error;
mod http;
pub mod logging;
mod pipeline;
mod producer;
mod retry;
mod strategy;
mod telemetry;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use consumer::{Consumer, ConsumerKind, CsvConsumer, DatabaseConsumer};
pub use context::{Page, PageReceiver, PageSender, RunContext};
pub use error::{ErrorCollector, ExtractionError, PipelineError, Stage};
pub use http::{HttpExchange, HttpPage, ReqwestHttpExchange};
pub use pipeline::{ExtractionPipeline, RunState, RunSummary};
pub use producer::{DatabaseProducer, HttpProducer, Producer, ProducerKind};
pub use retry::{RetryFailure, RetryOutcome, RetryPolicy, retry_with_backoff};
pub use strategy::{LoadStrategies, LoadStrategy};
pub use telemetry::{JobTelemetry, NoopTelemetry, TracingTelemetry};
