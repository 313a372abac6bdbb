//! Source collection - turns topics into raw threat reports
//!
//! Each topic goes to the primary collector first. A failed topic is served
//! by the fallback provider on its own (partial fallback); a quota failure or
//! an absent collector moves the whole stage to fallback for the rest of the
//! run.

mod scrape;

pub use scrape::{MAX_BODY_CHARS, ScrapeClient, parse_article};

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{
    CollectRequest, DynCollector, Failure, InvokePolicy, StageMode, StickyFallback,
};
use crate::fallback::FallbackProvider;
use crate::models::{Provenance, ThreatReport};

const DEFAULT_CONCURRENCY: usize = 4;

/// A topic the primary collector could not serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicFailure {
    pub topic: String,
    pub failure: Failure,
}

/// Bookkeeping for one collection pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub requested: usize,
    pub primary: usize,
    pub fallback: usize,
    pub failures: Vec<TopicFailure>,
    pub mode: StageMode,
}

impl CollectionSummary {
    pub fn is_degraded(&self) -> bool {
        self.fallback > 0
    }
}

/// Reports plus the summary of how they were obtained
#[derive(Debug, Clone)]
pub struct Collection {
    pub reports: Vec<ThreatReport>,
    pub summary: CollectionSummary,
}

struct TopicOutcome {
    index: usize,
    report: ThreatReport,
    failure: Option<Failure>,
}

/// Collects threat reports with per-topic fallback
pub struct SourceCollector {
    client: Option<DynCollector>,
    fallback: Arc<FallbackProvider>,
    policy: InvokePolicy,
    sticky: StickyFallback,
    concurrency: usize,
}

impl std::fmt::Debug for SourceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCollector")
            .field("client", &self.client.as_ref().map(|c| c.name().to_string()))
            .field("mode", &self.sticky.mode())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl SourceCollector {
    /// Collector backed by a primary client
    pub fn new(client: DynCollector, fallback: Arc<FallbackProvider>) -> Self {
        Self {
            client: Some(client),
            fallback,
            policy: InvokePolicy::default(),
            sticky: StickyFallback::new("collection"),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Collector with no primary client; every report comes from the fallback
    pub fn fallback_only(fallback: Arc<FallbackProvider>, reason: impl Into<String>) -> Self {
        Self {
            client: None,
            fallback,
            policy: InvokePolicy::default(),
            sticky: StickyFallback::tripped("collection", reason),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_policy(mut self, policy: InvokePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn mode(&self) -> StageMode {
        self.sticky.mode()
    }

    /// Collect up to `max_reports` reports in topic submission order
    pub async fn collect(&self, topics: &[String], max_reports: usize) -> Vec<ThreatReport> {
        self.collect_with_summary(topics, max_reports).await.reports
    }

    /// Like [`collect`](Self::collect), also returning the collection summary
    pub async fn collect_with_summary(&self, topics: &[String], max_reports: usize) -> Collection {
        // One report per distinct topic, so truncating topics equals truncating output
        let mut seen = HashSet::new();
        let topics: Vec<&str> = topics
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && seen.insert(*t))
            .take(max_reports)
            .collect();

        let workers = topics.len().min(self.concurrency).max(1);
        debug!(topics = topics.len(), workers, "Starting collection");

        let mut outcomes: Vec<TopicOutcome> = stream::iter(topics.iter().copied().enumerate())
            .map(|(index, topic)| self.collect_topic(index, topic))
            .buffer_unordered(workers)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        let mut ids = HashSet::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            if let Some(failure) = outcome.failure {
                failures.push(TopicFailure {
                    topic: outcome.report.topic.clone(),
                    failure,
                });
            }
            if ids.insert(outcome.report.source_id.clone()) {
                reports.push(outcome.report);
            } else {
                debug!(source_id = %outcome.report.source_id, "Dropping duplicate report");
            }
        }
        reports.truncate(max_reports);

        let primary = reports
            .iter()
            .filter(|r| r.collected_via == Provenance::Primary)
            .count();
        let summary = CollectionSummary {
            requested: topics.len(),
            primary,
            fallback: reports.len() - primary,
            failures,
            mode: self.sticky.mode(),
        };

        info!(
            reports = reports.len(),
            primary = summary.primary,
            fallback = summary.fallback,
            mode = %summary.mode,
            "Collection complete"
        );

        Collection { reports, summary }
    }

    async fn collect_topic(&self, index: usize, topic: &str) -> TopicOutcome {
        let mut failure = None;

        if let Some(client) = self.client.as_ref().filter(|_| !self.sticky.is_tripped()) {
            let request = CollectRequest {
                topic: topic.to_string(),
            };
            match self.policy.call(client.as_ref(), &request).await {
                Ok(doc) => {
                    return TopicOutcome {
                        index,
                        report: ThreatReport::new(
                            topic,
                            doc.title,
                            doc.body_text,
                            Provenance::Primary,
                        ),
                        failure: None,
                    };
                }
                Err(f) => {
                    warn!(topic, failure = %f, "Collection failed, using fallback report");
                    if f.is_sticky() {
                        self.sticky.trip(f.to_string());
                    }
                    failure = Some(f);
                }
            }
        }

        TopicOutcome {
            index,
            report: self.fallback.mock_report(topic, index),
            failure,
        }
    }
}
