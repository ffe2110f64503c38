//! Pipeline configuration
//!
//! Built once at startup and handed to [`ExtractionPipeline::new`](crate::ExtractionPipeline::new);
//! nothing here is global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ferry_connection::PoolConfig;
use ferry_core::{FerryError, Result};
use ferry_exchange::ExchangeOptions;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Retry, batching and parallelism settings for one pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts per unit of work, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Extractions fetched, and pages written, concurrently
    pub max_parallelism: usize,
    /// Pages drained from the channel per consumer batch
    pub consumer_batch_size: usize,
    /// Rows per source page
    pub page_limit: u64,
    pub command_timeout_secs: u64,
    pub csv_output_dir: PathBuf,
    pub pool: PoolConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_parallelism: 4,
            consumer_batch_size: 8,
            page_limit: 50_000,
            command_timeout_secs: 300,
            csv_output_dir: PathBuf::from("./output"),
            pool: PoolConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_ms(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_backoff_ms = base_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn with_consumer_batch_size(mut self, batch_size: usize) -> Self {
        self.consumer_batch_size = batch_size;
        self
    }

    pub fn with_page_limit(mut self, page_limit: u64) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    pub fn with_csv_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.csv_output_dir = dir.into();
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| FerryError::Configuration(format!("invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source).map_err(|e| match e {
            FerryError::Configuration(msg) => {
                FerryError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let problems: Vec<&str> = [
            (self.max_attempts == 0, "max_attempts must be at least 1"),
            (self.max_parallelism == 0, "max_parallelism must be at least 1"),
            (self.page_limit == 0, "page_limit must be at least 1"),
            (self.consumer_batch_size == 0, "consumer_batch_size must be at least 1"),
            (self.command_timeout_secs == 0, "command_timeout_secs must be at least 1"),
        ]
        .into_iter()
        .filter_map(|(bad, msg)| bad.then_some(msg))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(FerryError::Configuration(problems.join("; ")))
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn exchange_options(&self) -> ExchangeOptions {
        ExchangeOptions::default().with_command_timeout(self.command_timeout())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_backoff_ms, self.max_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_backoff_ms, 500);
        assert_eq!(config.page_limit, 50_000);
        assert_eq!(config.pool.max_size(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = PipelineConfig::from_toml_str(indoc! {r#"
            max_attempts = 5
            page_limit = 1000
            csv_output_dir = "/var/lib/ferry/csv"

            [pool]
            max_size = 4
            acquire_timeout_ms = 2000
        "#})
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.page_limit, 1000);
        assert_eq!(config.max_parallelism, 4);
        assert_eq!(config.csv_output_dir, PathBuf::from("/var/lib/ferry/csv"));
        assert_eq!(config.pool.max_size(), 4);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = PipelineConfig::default()
            .with_max_attempts(0)
            .with_max_parallelism(0);

        match config.validate() {
            Err(FerryError::Configuration(msg)) => {
                assert!(msg.contains("max_attempts"));
                assert!(msg.contains("max_parallelism"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        assert!(matches!(
            PipelineConfig::from_toml_str("max_attempts = \"three\""),
            Err(FerryError::Configuration(_))
        ));
    }

    #[test]
    fn test_derived_settings() {
        let config = PipelineConfig::default().with_command_timeout_secs(12);
        assert_eq!(config.exchange_options().command_timeout, Duration::from_secs(12));
        assert_eq!(config.retry_policy().max_attempts(), 3);
    }
}
