//! `ferry` - run extraction jobs from the command line

mod job;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferry_connection::PoolRegistry;
use ferry_pipeline::logging::{LoggingConfig, init_logging};
use ferry_pipeline::{ExtractionPipeline, PipelineConfig, PipelineError, TracingTelemetry};
use tokio_util::sync::CancellationToken;

use crate::job::JobFile;

#[derive(Debug, Parser)]
#[command(name = "ferry", version, about = "Move tables between databases, HTTP APIs and CSV files")]
struct Cli {
    /// Pipeline settings file; overrides the job's [pipeline] table
    #[arg(long, short, global = true, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the rolling JSON log
    #[arg(long, global = true, env = "FERRY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Write only the JSON log file
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a job file
    Run {
        job: PathBuf,
        /// Probe destinations first: full loads for empty tables, truncation for full reloads
        #[arg(long)]
        preflight: bool,
        /// Only run extractions with these names or aliases
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },
    /// Parse a job file and list what it would run
    Validate { job: PathBuf },
}

fn logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = if cli.quiet {
        LoggingConfig::production()
    } else {
        LoggingConfig::default()
    };
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_dir(dir);
    }
    if !cli.quiet {
        config = config.with_filter(cli.log_level.clone());
    }
    config
}

fn pipeline_config(cli: &Cli, job: &JobFile) -> Result<PipelineConfig> {
    match &cli.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("failed to load {}", path.display())),
        None => {
            job.pipeline.validate().context("invalid [pipeline] settings")?;
            Ok(job.pipeline.clone())
        }
    }
}

async fn run(cli: &Cli, job_path: &Path, preflight: bool, only: &[String]) -> Result<bool> {
    let job = JobFile::load(job_path)?;
    let extractions = job.resolve(only)?;
    let config = pipeline_config(cli, &job)?;

    let pools = Arc::new(PoolRegistry::new(config.pool.clone()));
    let producer = job.producer_kind().build(&config)?;
    let consumer = job.consumer_kind().build();
    let pipeline = ExtractionPipeline::new(config, Arc::clone(&pools), Arc::new(TracingTelemetry))?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let outcome = pipeline
        .run(extractions, producer, consumer, preflight || job.preflight, &token)
        .await;
    pools.close_all().await;

    match outcome {
        Ok(summary) => {
            println!(
                "moved {} rows in {} pages ({} bytes) in {:.1}s",
                summary.rows,
                summary.pages,
                summary.bytes,
                summary.elapsed.as_secs_f64()
            );
            Ok(true)
        }
        Err(error) => {
            report(&error);
            Ok(false)
        }
    }
}

fn report(error: &PipelineError) {
    eprintln!("{}", error);
    for failure in error.errors() {
        eprintln!("  {}", failure);
    }
}

fn validate(job_path: &Path) -> Result<()> {
    let job = JobFile::load(job_path)?;
    let extractions = job.resolve(&[])?;
    println!(
        "{} extraction(s), source {:?}, sink {:?}",
        extractions.len(),
        job.source,
        job.sink
    );
    for extraction in &extractions {
        println!(
            "  [{}] {} -> {}{}",
            extraction.id,
            extraction.name,
            extraction.destination_key(),
            if extraction.is_incremental { " (incremental)" } else { "" }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(&logging_config(&cli)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match &cli.command {
        Command::Run { job, preflight, only } => run(&cli, job, *preflight, only).await,
        Command::Validate { job } => validate(job).map(|()| true),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "ferry failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
