//! Job files: what to move, from where, to where

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use ferry_core::{Destination, Extraction, Origin, SourceType};
use ferry_pipeline::{ConsumerKind, PipelineConfig, ProducerKind};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sink {
    #[default]
    Database,
    Csv,
}

impl From<Sink> for ConsumerKind {
    fn from(sink: Sink) -> Self {
        match sink {
            Sink::Database => ConsumerKind::Database,
            Sink::Csv => ConsumerKind::Csv,
        }
    }
}

/// An extraction as written in a job file, pointing at its origin and
/// destination by alias
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionEntry {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(flatten)]
    pub extraction: Extraction,
}

/// A TOML job file
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub source: SourceType,
    #[serde(default)]
    pub sink: Sink,
    #[serde(default)]
    pub preflight: bool,
    /// Inline pipeline settings; a separate config file takes precedence
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub origins: Vec<Origin>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub extractions: Vec<ExtractionEntry>,
}

impl JobFile {
    pub fn parse(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid job file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn producer_kind(&self) -> ProducerKind {
        self.source.into()
    }

    pub fn consumer_kind(&self) -> ConsumerKind {
        self.sink.into()
    }

    /// Attach origins and destinations to every extraction.
    ///
    /// `only` keeps extractions whose name or alias is listed; empty keeps all.
    pub fn resolve(&self, only: &[String]) -> Result<Vec<Extraction>> {
        let origins: HashMap<&str, &Origin> = self.origins.iter().map(|o| (o.alias.as_str(), o)).collect();
        let destinations: HashMap<&str, &Destination> =
            self.destinations.iter().map(|d| (d.alias.as_str(), d)).collect();

        let mut resolved = Vec::new();
        for entry in &self.extractions {
            let mut extraction = entry.extraction.clone();
            if !only.is_empty()
                && !only
                    .iter()
                    .any(|name| name == &extraction.name || name == extraction.table_alias())
            {
                continue;
            }
            if extraction.source_type != self.source {
                bail!(
                    "extraction '{}' reads from {:?} but the job source is {:?}",
                    extraction.name,
                    extraction.source_type,
                    self.source
                );
            }

            if let Some(alias) = &entry.origin {
                let origin = origins
                    .get(alias.as_str())
                    .with_context(|| format!("extraction '{}' names unknown origin '{}'", extraction.name, alias))?;
                extraction.origin = Some((*origin).clone());
            }
            if let Some(alias) = &entry.destination {
                let destination = destinations.get(alias.as_str()).with_context(|| {
                    format!("extraction '{}' names unknown destination '{}'", extraction.name, alias)
                })?;
                extraction.destination = Some((*destination).clone());
            }

            match self.source {
                SourceType::Db if extraction.origin.is_none() => {
                    bail!("extraction '{}' has no origin", extraction.name)
                }
                SourceType::Http if extraction.http.is_none() => {
                    bail!("extraction '{}' has no [http] section", extraction.name)
                }
                _ => {}
            }
            if self.sink == Sink::Database && extraction.destination.is_none() {
                bail!("extraction '{}' has no destination", extraction.name);
            }
            resolved.push(extraction);
        }

        if resolved.is_empty() {
            bail!("job selects no extractions");
        }
        Ok(resolved)
    }
}
