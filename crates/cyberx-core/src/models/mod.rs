//! Data model shared by every pipeline stage
//!
//! All records are immutable once built. Every record carries a provenance tag
//! (`collected_via`, `extracted_via`, `answered_via`) so degraded output can be
//! told apart from live output after the fact.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Where a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Produced by the live external service
    Primary,
    /// Produced by the deterministic fallback provider
    Fallback,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Primary => write!(f, "primary"),
            Provenance::Fallback => write!(f, "fallback"),
        }
    }
}

/// How a query was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnsweredVia {
    Primary,
    Fallback,
    Insufficient,
}

impl std::fmt::Display for AnsweredVia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnsweredVia::Primary => write!(f, "primary"),
            AnsweredVia::Fallback => write!(f, "fallback"),
            AnsweredVia::Insufficient => write!(f, "insufficient"),
        }
    }
}

/// A raw threat report obtained by the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub source_id: String,
    pub topic: String,
    pub title: String,
    pub body_text: String,
    pub collected_via: Provenance,
    pub timestamp: DateTime<Utc>,
}

impl ThreatReport {
    pub fn new(
        topic: impl Into<String>,
        title: impl Into<String>,
        body_text: impl Into<String>,
        collected_via: Provenance,
    ) -> Self {
        let topic = topic.into();
        Self {
            source_id: source_id_for(&topic, collected_via),
            topic,
            title: title.into(),
            body_text: body_text.into(),
            collected_via,
            timestamp: Utc::now(),
        }
    }
}

/// Stable source identifier derived from the topic
///
/// Primary and fallback reports for the same topic get distinct prefixes so an
/// id alone tells where the text came from.
pub fn source_id_for(topic: &str, via: Provenance) -> String {
    let digest = hex::encode(Sha256::digest(topic.trim().as_bytes()));
    let prefix = match via {
        Provenance::Primary => "src",
        Provenance::Fallback => "mock",
    };
    format!("{}-{}", prefix, &digest[..16])
}

/// Tag added to records produced when nothing could be extracted
pub const INSUFFICIENT_EXTRACTION_TAG: &str = "insufficient-extraction";

/// One structured intelligence record
///
/// Fields are private; the only way in is [`IntelligenceRecord::new`], which
/// validates the shape for both primary and fallback paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceRecord {
    record_id: String,
    actor_name: String,
    nexus: String,
    activity_summary: String,
    tags: BTreeSet<String>,
    extracted_via: Provenance,
    source_report_id: String,
}

impl IntelligenceRecord {
    /// Build a validated record with a fresh unique id
    pub fn new(
        actor_name: &str,
        nexus: &str,
        activity_summary: &str,
        tags: impl IntoIterator<Item = impl AsRef<str>>,
        extracted_via: Provenance,
        source_report_id: &str,
    ) -> Result<Self> {
        let actor_name = actor_name.trim();
        let nexus = nexus.trim();
        let activity_summary = activity_summary.trim();

        if actor_name.is_empty() {
            return Err(Error::InvalidRecord("actor_name is blank".to_string()));
        }
        if nexus.is_empty() {
            return Err(Error::InvalidRecord("nexus is blank".to_string()));
        }
        if activity_summary.is_empty() {
            return Err(Error::InvalidRecord("activity_summary is blank".to_string()));
        }

        let tags = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            record_id: Uuid::new_v4().to_string(),
            actor_name: actor_name.to_string(),
            nexus: nexus.to_string(),
            activity_summary: activity_summary.to_string(),
            tags,
            extracted_via,
            source_report_id: source_report_id.to_string(),
        })
    }

    /// The generic record produced when neither path yields anything usable
    pub fn insufficient(source_report_id: &str) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            actor_name: "Unknown".to_string(),
            nexus: "Unknown".to_string(),
            activity_summary: "Insufficient extraction: no actor could be identified.".to_string(),
            tags: BTreeSet::from([INSUFFICIENT_EXTRACTION_TAG.to_string()]),
            extracted_via: Provenance::Fallback,
            source_report_id: source_report_id.to_string(),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    pub fn nexus(&self) -> &str {
        &self.nexus
    }

    pub fn activity_summary(&self) -> &str {
        &self.activity_summary
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn extracted_via(&self) -> Provenance {
        self.extracted_via
    }

    pub fn source_report_id(&self) -> &str {
        &self.source_report_id
    }

    pub fn is_insufficient(&self) -> bool {
        self.tags.contains(INSUFFICIENT_EXTRACTION_TAG)
    }

    /// Text handed to the embedder and used as retrieval context
    pub fn document_text(&self) -> String {
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        format!(
            "Actor: {}\nNexus: {}-nexus\nSummary: {}\nTags: {}",
            self.actor_name,
            self.nexus,
            self.activity_summary,
            tags.join(", ")
        )
    }
}

/// Embedding of one record, owned by the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub record_id: String,
    pub vector: Vec<f32>,
    pub dimension: usize,
}

impl EmbeddingEntry {
    pub fn new(record_id: impl Into<String>, vector: Vec<f32>) -> Self {
        let dimension = vector.len();
        Self {
            record_id: record_id.into(),
            vector,
            dimension,
        }
    }
}

/// One analyst query and how it was answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_text: String,
    pub retrieved_record_ids: Vec<String>,
    pub answer_text: String,
    pub answered_via: AnsweredVia,
    pub timestamp: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(
        query_text: impl Into<String>,
        retrieved_record_ids: Vec<String>,
        answer_text: impl Into<String>,
        answered_via: AnsweredVia,
    ) -> Self {
        Self {
            query_text: query_text.into(),
            retrieved_record_ids,
            answer_text: answer_text.into(),
            answered_via,
            timestamp: Utc::now(),
        }
    }
}
