//! Deterministic substitute output for every degraded stage
//!
//! The provider is an injected value rather than a global table so tests and
//! deployments can swap the dataset. Everything it hands out has exactly the
//! shape of live output and carries `fallback` provenance.

mod dataset;

pub use dataset::{FallbackDataset, MockIntel, PredefinedAnswer};

use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{IntelligenceRecord, Provenance, ThreatReport};

/// Supplies mock reports, mock records and canned answers
#[derive(Debug, Clone)]
pub struct FallbackProvider {
    dataset: FallbackDataset,
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new(FallbackDataset::builtin())
    }
}

impl FallbackProvider {
    pub fn new(dataset: FallbackDataset) -> Self {
        Self { dataset }
    }

    /// Load the dataset from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Ok(Self::new(FallbackDataset::from_json_file(path)?))
    }

    pub fn dataset(&self) -> &FallbackDataset {
        &self.dataset
    }

    /// Questions the canned table can answer, in table order
    pub fn suggested_questions(&self) -> impl Iterator<Item = &str> {
        self.dataset.answers.iter().map(|a| a.question.as_str())
    }

    /// Substitute report for a topic the collector could not fetch
    ///
    /// The curated entry is chosen by actor name appearing in the topic, or by
    /// `ordinal` when the topic names nobody we know.
    pub fn mock_report(&self, topic: &str, ordinal: usize) -> ThreatReport {
        let number = ordinal + 1;
        match self.entry_for_topic(topic, ordinal) {
            Some(entry) => {
                let mut body = format!(
                    "{} is a {}-nexus threat actor. {}",
                    entry.actor_name, entry.nexus, entry.summary
                );
                if !entry.aliases.is_empty() {
                    body.push_str(&format!(" Also tracked as {}.", entry.aliases.join(", ")));
                }
                if !entry.tags.is_empty() {
                    body.push_str(&format!(" Observed techniques: {}.", entry.tags.join(", ")));
                }
                let title = if entry.timeline.is_empty() {
                    format!("Mock Threat Report {}: {}", number, entry.actor_name)
                } else {
                    format!(
                        "Mock Threat Report {}: {} ({})",
                        number, entry.actor_name, entry.timeline
                    )
                };
                ThreatReport::new(topic, title, body, Provenance::Fallback)
            }
            None => ThreatReport::new(
                topic,
                format!("Mock Threat Report {}", number),
                format!("No curated intelligence is available for {}.", topic.trim()),
                Provenance::Fallback,
            ),
        }
    }

    fn entry_for_topic(&self, topic: &str, ordinal: usize) -> Option<&MockIntel> {
        let records = &self.dataset.records;
        if records.is_empty() {
            return None;
        }
        let topic = topic.to_lowercase();
        records
            .iter()
            .find(|r| {
                let name = r.actor_name.to_lowercase();
                topic.contains(&name) || topic.contains(&name.replace(' ', "-"))
            })
            .or_else(|| records.get(ordinal % records.len()))
    }

    /// Curated entry whose actor name appears in the report title, else body
    ///
    /// When several names match, the longest wins so `APT41` is not shadowed
    /// by a hypothetical `APT4`.
    pub fn match_record(&self, report: &ThreatReport) -> Result<&MockIntel> {
        [&report.title, &report.body_text]
            .into_iter()
            .find_map(|text| self.longest_actor_in(text))
            .ok_or_else(|| Error::NoMatchFound(report.title.clone()))
    }

    fn longest_actor_in(&self, text: &str) -> Option<&MockIntel> {
        let haystack = text.to_lowercase();
        self.dataset
            .records
            .iter()
            .filter(|r| haystack.contains(&r.actor_name.to_lowercase()))
            .fold(None, |best: Option<&MockIntel>, r| match best {
                Some(b) if b.actor_name.len() >= r.actor_name.len() => Some(b),
                _ => Some(r),
            })
    }

    /// Turn a curated entry into a validated record for the given report
    pub fn record_from(
        &self,
        entry: &MockIntel,
        source_report_id: &str,
    ) -> Result<IntelligenceRecord> {
        let summary = if entry.timeline.is_empty() {
            entry.summary.clone()
        } else {
            format!("{} ({})", entry.summary, entry.timeline)
        };
        IntelligenceRecord::new(
            &entry.actor_name,
            &entry.nexus,
            &summary,
            &entry.tags,
            Provenance::Fallback,
            source_report_id,
        )
    }

    /// Canned answer for a query
    ///
    /// Matching is case-insensitive: an exact match of the normalized question
    /// wins, otherwise the first entry whose keywords all appear as tokens of
    /// the query. No synonym handling.
    pub fn lookup_answer(&self, query: &str) -> Result<&PredefinedAnswer> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(Error::NoMatchFound(query.to_string()));
        }

        if let Some(exact) = self
            .dataset
            .answers
            .iter()
            .find(|a| normalize_query(&a.question) == normalized)
        {
            return Ok(exact);
        }

        let tokens = tokenize(&normalized);
        self.dataset
            .answers
            .iter()
            .find(|a| {
                !a.keywords.is_empty()
                    && a.keywords
                        .iter()
                        .all(|k| tokens.contains(k.trim().to_lowercase().as_str()))
            })
            .ok_or_else(|| Error::NoMatchFound(query.to_string()))
    }
}

/// Lower-case, collapse whitespace and drop trailing punctuation
pub fn normalize_query(query: &str) -> String {
    let collapsed = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['?', '!', '.'])
        .trim_end()
        .to_string()
}

fn tokenize(text: &str) -> HashSet<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}
