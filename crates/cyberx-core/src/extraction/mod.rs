//! Extraction - turns raw reports into validated intelligence records
//!
//! The engine never fails: a report the primary extractor cannot handle is
//! matched against the curated fallback records, and a report nobody
//! recognises still yields a generic "insufficient extraction" record.

mod llm_extractor;

pub use llm_extractor::{LlmExtractor, parse_extraction};

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{
    DynExtractor, ExtractRequest, ExtractedFields, Failure, InvokePolicy, StageMode,
    StickyFallback,
};
use crate::fallback::FallbackProvider;
use crate::models::{IntelligenceRecord, Provenance, ThreatReport};

/// Counts for one extraction pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub primary: usize,
    pub fallback: usize,
    pub insufficient: usize,
    pub mode: StageMode,
}

impl ExtractionSummary {
    pub fn is_degraded(&self) -> bool {
        self.fallback > 0
    }
}

/// Records plus the summary of how they were produced
#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<IntelligenceRecord>,
    pub summary: ExtractionSummary,
}

pub struct ExtractionEngine {
    client: Option<DynExtractor>,
    fallback: Arc<FallbackProvider>,
    policy: InvokePolicy,
    sticky: StickyFallback,
}

impl std::fmt::Debug for ExtractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("client", &self.client.as_ref().map(|c| c.name().to_string()))
            .field("mode", &self.sticky.mode())
            .finish()
    }
}

impl ExtractionEngine {
    pub fn new(client: DynExtractor, fallback: Arc<FallbackProvider>) -> Self {
        Self {
            client: Some(client),
            fallback,
            policy: InvokePolicy::default(),
            sticky: StickyFallback::new("extraction"),
        }
    }

    pub fn fallback_only(fallback: Arc<FallbackProvider>, reason: impl Into<String>) -> Self {
        Self {
            client: None,
            fallback,
            policy: InvokePolicy::default(),
            sticky: StickyFallback::tripped("extraction", reason),
        }
    }

    pub fn with_policy(mut self, policy: InvokePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> StageMode {
        self.sticky.mode()
    }

    /// Extract one record from a report
    pub async fn extract(&self, report: &ThreatReport) -> IntelligenceRecord {
        if let Some(client) = self.client.as_ref().filter(|_| !self.sticky.is_tripped()) {
            let request = ExtractRequest {
                title: report.title.clone(),
                body_text: report.body_text.clone(),
            };
            let outcome = self
                .policy
                .call(client.as_ref(), &request)
                .await
                .and_then(|fields| primary_record(fields, report));
            match outcome {
                Ok(record) => {
                    debug!(
                        source_id = %report.source_id,
                        actor = record.actor_name(),
                        "Extracted record"
                    );
                    return record;
                }
                Err(failure) => {
                    warn!(
                        source_id = %report.source_id,
                        failure = %failure,
                        "Extraction failed, using fallback"
                    );
                    if failure.is_sticky() {
                        self.sticky.trip(failure.to_string());
                    }
                }
            }
        }

        self.fallback_record(report)
    }

    fn fallback_record(&self, report: &ThreatReport) -> IntelligenceRecord {
        let matched = self
            .fallback
            .match_record(report)
            .and_then(|entry| self.fallback.record_from(entry, &report.source_id));
        match matched {
            Ok(record) => record,
            Err(err) => {
                debug!(source_id = %report.source_id, error = %err, "No curated record matched");
                IntelligenceRecord::insufficient(&report.source_id)
            }
        }
    }

    /// Extract every report in order
    pub async fn extract_all(&self, reports: &[ThreatReport]) -> Extraction {
        let mut records = Vec::with_capacity(reports.len());
        for report in reports {
            records.push(self.extract(report).await);
        }

        let primary = records
            .iter()
            .filter(|r| r.extracted_via() == Provenance::Primary)
            .count();
        let insufficient = records.iter().filter(|r| r.is_insufficient()).count();
        let summary = ExtractionSummary {
            primary,
            fallback: records.len() - primary,
            insufficient,
            mode: self.sticky.mode(),
        };

        info!(
            records = records.len(),
            primary = summary.primary,
            fallback = summary.fallback,
            insufficient = summary.insufficient,
            mode = %summary.mode,
            "Extraction complete"
        );

        Extraction { records, summary }
    }
}

fn primary_record(
    fields: ExtractedFields,
    report: &ThreatReport,
) -> Result<IntelligenceRecord, Failure> {
    let nexus = if fields.nexus.trim().is_empty() {
        "Unknown"
    } else {
        fields.nexus.as_str()
    };
    IntelligenceRecord::new(
        &fields.actor_name,
        nexus,
        &fields.summary,
        &fields.tags,
        Provenance::Primary,
        &report.source_id,
    )
    .map_err(|e| Failure::InvalidResponse(e.to_string()))
}
