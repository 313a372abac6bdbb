//! Audit logging - one write-once JSON artifact per run
//!
//! Phases, reports, records and queries are accumulated in memory and written
//! as `<product> #<version>.json` when the session closes.

mod version;

pub use version::VersionCounter;

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{IntelligenceRecord, QueryRecord, ThreatReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Ran entirely on the primary path
    Completed,
    /// Ran, but some or all output came from the fallback provider
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub name: String,
    pub status: PhaseStatus,
    pub detail: Value,
}

/// Everything written to the artifact
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionLog {
    pub version: u32,
    pub phases: Vec<PhaseSummary>,
    pub reports: Vec<ThreatReport>,
    pub records: Vec<IntelligenceRecord>,
    pub queries: Vec<QueryRecord>,
}

/// Location and version of a written artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    pub path: PathBuf,
    pub version: u32,
}

#[derive(Debug)]
pub struct AuditLogger {
    output_dir: PathBuf,
    counter: VersionCounter,
    log: ExecutionLog,
}

impl AuditLogger {
    pub fn new(output_dir: impl Into<PathBuf>, product: &str) -> Result<Self> {
        if product.trim().is_empty() || product.contains(['#', '/', '\\']) {
            return Err(Error::ConfigError(format!(
                "product name '{}' cannot be used in an artifact file name",
                product
            )));
        }
        Ok(Self {
            output_dir: output_dir.into(),
            counter: VersionCounter::new(product)?,
            log: ExecutionLog::default(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn record_phase(
        &mut self,
        name: impl Into<String>,
        status: PhaseStatus,
        detail: impl Serialize,
    ) {
        let name = name.into();
        let detail = serde_json::to_value(detail).unwrap_or_else(|e| {
            warn!(phase = %name, error = %e, "Phase detail could not be serialized");
            Value::Null
        });
        self.log.phases.push(PhaseSummary {
            name,
            status,
            detail,
        });
    }

    pub fn record_reports(&mut self, reports: &[ThreatReport]) {
        self.log.reports.extend_from_slice(reports);
    }

    pub fn record_records(&mut self, records: &[IntelligenceRecord]) {
        self.log.records.extend_from_slice(records);
    }

    pub fn record_query(&mut self, query: QueryRecord) {
        self.log.queries.push(query);
    }

    /// Write the log under the next free version
    ///
    /// The file is created with create-new semantics; an existing file with
    /// the chosen name is reported as [`Error::ArtifactExists`], never
    /// overwritten.
    pub fn finalize(&mut self) -> Result<PersistedArtifact> {
        fs::create_dir_all(&self.output_dir)?;

        let version = self.counter.next(&self.output_dir)?;
        let path = self.output_dir.join(self.counter.file_name(version));
        self.log.version = version;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::ArtifactExists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let json = serde_json::to_string_pretty(&self.log)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        info!(path = %path.display(), version, "Execution log written");
        Ok(PersistedArtifact { path, version })
    }
}
