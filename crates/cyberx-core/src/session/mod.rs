//! Session controller - drives one run from collection to the closed artifact
//!
//! States advance strictly `Collecting → Extracting → Indexing → Querying →
//! Closed`. The knowledge base is moved into the retrieval engine once
//! indexing completes, so no query can observe a half-built index.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditLogger, PersistedArtifact, PhaseStatus};
use crate::capability::{DynResponder, InvokePolicy};
use crate::collector::{CollectionSummary, SourceCollector};
use crate::error::{Error, Result};
use crate::extraction::{ExtractionEngine, ExtractionSummary};
use crate::fallback::FallbackProvider;
use crate::knowledge::KnowledgeBase;
use crate::models::{AnsweredVia, IntelligenceRecord};
use crate::retrieval::{DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_K, RetrievalEngine};

/// Lines that end the query loop, compared case-insensitively
pub const TERMINATION_TOKENS: &[&str] = &["exit", "quit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Collecting,
    Extracting,
    Indexing,
    Querying,
    Closed,
}

impl SessionState {
    /// The only state this one may move to
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Collecting => Some(Self::Extracting),
            Self::Extracting => Some(Self::Indexing),
            Self::Indexing => Some(Self::Querying),
            Self::Querying => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Extracting => "extracting",
            Self::Indexing => "indexing",
            Self::Querying => "querying",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of submitting one line to the query loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Answered { text: String, via: AnsweredVia },
    /// Blank line, nothing recorded
    Ignored,
    /// Termination token; the caller should close the session
    Terminated,
}

/// What the pipeline phases produced
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub collection: CollectionSummary,
    pub extraction: ExtractionSummary,
    pub indexed: usize,
    pub index_failures: usize,
}

pub struct SessionController {
    state: SessionState,
    topics: Vec<String>,
    max_reports: usize,
    collector: SourceCollector,
    extractor: ExtractionEngine,
    knowledge_base: Option<KnowledgeBase>,
    retrieval: Option<RetrievalEngine>,
    responder: Option<DynResponder>,
    responder_reason: String,
    retrieval_policy: InvokePolicy,
    top_k: usize,
    min_similarity: f32,
    fallback: Arc<FallbackProvider>,
    audit: AuditLogger,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("topics", &self.topics.len())
            .field("max_reports", &self.max_reports)
            .field("collector", &self.collector)
            .field("extractor", &self.extractor)
            .field("retrieval", &self.retrieval)
            .finish()
    }
}

impl SessionController {
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Indexed knowledge base, available once the pipeline has run
    pub fn knowledge_base(&self) -> Option<&KnowledgeBase> {
        self.retrieval
            .as_ref()
            .map(|r| r.knowledge_base())
            .or(self.knowledge_base.as_ref())
    }

    pub fn suggested_questions(&self) -> impl Iterator<Item = &str> {
        self.fallback.suggested_questions()
    }

    fn advance(&mut self, to: SessionState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        info!(from = %self.state, to = %to, "Session transition");
        self.state = to;
        Ok(())
    }

    /// Run collection, extraction and indexing, leaving the session in `Querying`
    pub async fn run_pipeline(&mut self) -> Result<PipelineSummary> {
        if self.state != SessionState::Collecting {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: SessionState::Collecting.to_string(),
            });
        }

        let collection = self
            .collector
            .collect_with_summary(&self.topics, self.max_reports)
            .await;
        self.audit.record_phase(
            "collection",
            degraded_if(collection.summary.is_degraded()),
            &collection.summary,
        );
        self.audit.record_reports(&collection.reports);
        self.advance(SessionState::Extracting)?;

        let extraction = self.extractor.extract_all(&collection.reports).await;
        self.audit.record_phase(
            "extraction",
            degraded_if(extraction.summary.is_degraded()),
            &extraction.summary,
        );
        self.audit.record_records(&extraction.records);
        self.advance(SessionState::Indexing)?;

        let mut knowledge_base = self
            .knowledge_base
            .take()
            .ok_or(Error::MissingCollaborator("knowledge_base"))?;
        let (indexed, index_failures) =
            index_records(&mut knowledge_base, extraction.records).await;
        let status = if index_failures == 0 {
            PhaseStatus::Completed
        } else if indexed == 0 {
            PhaseStatus::Failed
        } else {
            PhaseStatus::Degraded
        };
        self.audit.record_phase(
            "indexing",
            status,
            json!({
                "indexed": indexed,
                "failed": index_failures,
                "entries": knowledge_base.len(),
                "dimension": knowledge_base.dimension(),
            }),
        );

        let retrieval = match self.responder.take() {
            Some(responder) => {
                RetrievalEngine::new(knowledge_base, responder, self.fallback.clone())
            }
            None => RetrievalEngine::fallback_only(
                knowledge_base,
                self.fallback.clone(),
                self.responder_reason.clone(),
            ),
        }
        .with_policy(self.retrieval_policy)
        .with_top_k(self.top_k)
        .with_min_similarity(self.min_similarity);
        self.retrieval = Some(retrieval);
        self.advance(SessionState::Querying)?;

        Ok(PipelineSummary {
            collection: collection.summary,
            extraction: extraction.summary,
            indexed,
            index_failures,
        })
    }

    /// Handle one line of analyst input
    pub async fn submit(&mut self, line: &str) -> Result<QueryOutcome> {
        if self.state != SessionState::Querying {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: SessionState::Querying.to_string(),
            });
        }

        let query = line.trim();
        if query.is_empty() {
            return Ok(QueryOutcome::Ignored);
        }
        if TERMINATION_TOKENS
            .iter()
            .any(|t| query.eq_ignore_ascii_case(t))
        {
            return Ok(QueryOutcome::Terminated);
        }

        let retrieval = self
            .retrieval
            .as_ref()
            .ok_or(Error::MissingCollaborator("retrieval"))?;
        let (text, record) = retrieval.answer(query).await;
        let via = record.answered_via;
        self.audit.record_query(record);
        Ok(QueryOutcome::Answered { text, via })
    }

    /// Close the session and write the execution log
    pub fn close(&mut self) -> Result<PersistedArtifact> {
        self.advance(SessionState::Closed)?;
        if let Some(retrieval) = &self.retrieval {
            let detail = json!({
                "queries": self.audit.log().queries.len(),
                "mode": retrieval.mode(),
            });
            self.audit.record_phase("querying", PhaseStatus::Completed, detail);
        }
        self.audit.finalize()
    }
}

fn degraded_if(degraded: bool) -> PhaseStatus {
    if degraded {
        PhaseStatus::Degraded
    } else {
        PhaseStatus::Completed
    }
}

async fn index_records(
    knowledge_base: &mut KnowledgeBase,
    records: Vec<IntelligenceRecord>,
) -> (usize, usize) {
    let mut indexed = 0;
    let mut failed = 0;
    for record in records {
        match knowledge_base.add(record).await {
            Ok(()) => indexed += 1,
            Err(err) => {
                warn!(error = %err, "Record left out of the index");
                failed += 1;
            }
        }
    }
    info!(indexed, failed, "Indexing complete");
    (indexed, failed)
}

/// Builder for [`SessionController`]
///
/// The knowledge base, fallback provider and audit logger are required. A
/// missing collector, extractor or responder puts that stage in fallback mode.
#[derive(Default)]
pub struct SessionControllerBuilder {
    topics: Vec<String>,
    max_reports: Option<usize>,
    collector: Option<SourceCollector>,
    extractor: Option<ExtractionEngine>,
    knowledge_base: Option<KnowledgeBase>,
    responder: Option<DynResponder>,
    responder_reason: Option<String>,
    retrieval_policy: Option<InvokePolicy>,
    top_k: Option<usize>,
    min_similarity: Option<f32>,
    fallback: Option<Arc<FallbackProvider>>,
    audit: Option<AuditLogger>,
}

impl SessionControllerBuilder {
    pub fn topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_reports(mut self, max_reports: usize) -> Self {
        self.max_reports = Some(max_reports);
        self
    }

    pub fn collector(mut self, collector: SourceCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn extractor(mut self, extractor: ExtractionEngine) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn knowledge_base(mut self, knowledge_base: KnowledgeBase) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }

    pub fn responder(mut self, responder: DynResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Why answering runs without a responder, shown in the audit log
    pub fn responder_unavailable(mut self, reason: impl Into<String>) -> Self {
        self.responder = None;
        self.responder_reason = Some(reason.into());
        self
    }

    pub fn retrieval_policy(mut self, policy: InvokePolicy) -> Self {
        self.retrieval_policy = Some(policy);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn fallback(mut self, fallback: Arc<FallbackProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> Result<SessionController> {
        let knowledge_base = self
            .knowledge_base
            .ok_or(Error::MissingCollaborator("knowledge_base"))?;
        let fallback = self
            .fallback
            .ok_or(Error::MissingCollaborator("fallback_provider"))?;
        let audit = self.audit.ok_or(Error::MissingCollaborator("audit_logger"))?;

        let collector = self.collector.unwrap_or_else(|| {
            SourceCollector::fallback_only(fallback.clone(), "no collector configured")
        });
        let extractor = self.extractor.unwrap_or_else(|| {
            ExtractionEngine::fallback_only(fallback.clone(), "no extractor configured")
        });
        let max_reports = self.max_reports.unwrap_or(self.topics.len().max(1));

        Ok(SessionController {
            state: SessionState::Collecting,
            topics: self.topics,
            max_reports,
            collector,
            extractor,
            knowledge_base: Some(knowledge_base),
            retrieval: None,
            responder: self.responder,
            responder_reason: self
                .responder_reason
                .unwrap_or_else(|| "no responder configured".to_string()),
            retrieval_policy: self.retrieval_policy.unwrap_or_default(),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            min_similarity: self.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY),
            fallback,
            audit,
        })
    }
}
