//! Byte-usage reporting to the job ledger

/// Receives the size of every fetched page
pub trait JobTelemetry: Send + Sync {
    fn record_bytes(&self, extraction_id: i64, bytes: u64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl JobTelemetry for NoopTelemetry {
    fn record_bytes(&self, _extraction_id: i64, _bytes: u64) {}
}

/// Emits each page's size as a debug event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl JobTelemetry for TracingTelemetry {
    fn record_bytes(&self, extraction_id: i64, bytes: u64) {
        tracing::debug!(extraction_id, bytes, "page bytes transferred");
    }
}
