//! Per-extraction errors and the run-level result

use std::fmt;
use std::sync::Arc;

use ferry_core::{Extraction, FerryError};
use serde::Serialize;

/// Which side of the pipeline a failure happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Producer,
    Consumer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Producer => f.write_str("producer"),
            Stage::Consumer => f.write_str("consumer"),
        }
    }
}

/// A terminal failure of one extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("extraction {extraction_id} ({extraction_name}) failed in {stage}: {message}")]
pub struct ExtractionError {
    pub extraction_id: i64,
    pub extraction_name: String,
    pub stage: Stage,
    pub message: String,
    /// Whether another attempt could have succeeded
    pub retryable: bool,
}

impl ExtractionError {
    pub fn new(extraction: &Extraction, stage: Stage, error: &FerryError) -> Self {
        Self {
            extraction_id: extraction.id,
            extraction_name: extraction.name.clone(),
            stage,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Outcome of a run that did not complete cleanly
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{} extraction(s) failed", .0.len())]
    Failed(Vec<ExtractionError>),

    #[error("pipeline run cancelled ({} error(s) collected)", errors.len())]
    Cancelled { errors: Vec<ExtractionError> },

    #[error("pipeline task failed: {message}")]
    Task {
        message: String,
        errors: Vec<ExtractionError>,
    },

    #[error(transparent)]
    Core(#[from] FerryError),
}

impl PipelineError {
    /// Per-extraction errors collected before the run ended
    pub fn errors(&self) -> &[ExtractionError] {
        match self {
            PipelineError::Failed(errors)
            | PipelineError::Cancelled { errors }
            | PipelineError::Task { errors, .. } => errors,
            PipelineError::Core(_) => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}

/// Shared sink both pipeline sides record failures into
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    errors: Arc<parking_lot::Mutex<Vec<ExtractionError>>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; cancellations are a clean stop and are not recorded
    pub fn record(&self, extraction: &Extraction, stage: Stage, error: &FerryError) {
        if error.is_cancelled() {
            return;
        }
        tracing::error!(
            extraction_id = extraction.id,
            extraction = %extraction.name,
            %stage,
            error = %error,
            "extraction failed"
        );
        self.errors.lock().push(ExtractionError::new(extraction, stage, error));
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Whether any failure was recorded against `extraction_id`
    pub fn has_failed(&self, extraction_id: i64) -> bool {
        self.errors.lock().iter().any(|e| e.extraction_id == extraction_id)
    }

    pub fn snapshot(&self) -> Vec<ExtractionError> {
        self.errors.lock().clone()
    }

    pub fn take(&self) -> Vec<ExtractionError> {
        std::mem::take(&mut *self.errors.lock())
    }
}
