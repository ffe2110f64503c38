//! Tracing setup for ferry processes
//!
//! Console output is pretty-printed for operators; the rolling JSON file is
//! what gets attached to incident reports. `RUST_LOG` overrides the default
//! filter.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "ferry.log";

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Directory the daily JSON log files rotate in
    pub log_dir: PathBuf,
    pub enable_json_logs: bool,
    pub enable_console_logs: bool,
    /// Include file and line in console output
    pub include_location: bool,
    /// Log span open/close events
    pub enable_spans: bool,
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "info,ferry_pipeline=debug,ferry_exchange=debug,ferry_connection=debug".to_string(),
        }
    }
}

impl LoggingConfig {
    /// JSON file only, info level for ferry crates
    pub fn production() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: false,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,ferry_cli=info,ferry_pipeline=info,ferry_exchange=info,ferry_connection=info,ferry_drivers=info".to_string(),
        }
    }

    pub fn development() -> Self {
        Self {
            enable_spans: true,
            ..Self::default()
        }
    }

    /// Console only, nothing written to disk
    pub fn testing() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("ferry-tests"),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: true,
            enable_spans: true,
            default_filter: "debug".to_string(),
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Default log directory under the user's local data dir
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ferry")
        .join("logs")
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process. Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW rather than ENTER: async spans are re-entered on every poll
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();
    let mut guard = None;

    if config.enable_console_logs {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_span_events(span_events.clone())
                .with_ansi(true)
                .pretty()
                .with_filter(env_filter.clone())
                .boxed(),
        );
    }

    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);

        layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(span_events)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(writer)
                .with_filter(env_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_is_quiet() {
        let config = LoggingConfig::production();
        assert!(!config.enable_console_logs);
        assert!(config.enable_json_logs);
        assert!(config.default_filter.starts_with("warn"));
        assert!(config.log_dir.ends_with("ferry/logs"));
    }

    #[test]
    fn test_testing_writes_nothing() {
        let config = LoggingConfig::testing().with_filter("trace");
        assert!(!config.enable_json_logs);
        assert_eq!(config.default_filter, "trace");
    }
}
