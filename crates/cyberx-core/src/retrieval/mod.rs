//! Retrieval-augmented answering over the knowledge base
//!
//! A query is answered from retrieved context when the responder is usable,
//! otherwise from the canned answer table, otherwise with the fixed
//! [`INSUFFICIENT_DATA`] sentinel. Nothing is ever invented.

mod responder;

pub use responder::{LlmResponder, answer_prompt};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capability::{AnswerRequest, DynResponder, InvokePolicy, StageMode, StickyFallback};
use crate::error::{Error, Result};
use crate::fallback::FallbackProvider;
use crate::knowledge::KnowledgeBase;
use crate::models::{AnsweredVia, QueryRecord};

/// Answer given when neither context nor the canned table can help
pub const INSUFFICIENT_DATA: &str = "Insufficient data.";

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.2;

pub struct RetrievalEngine {
    knowledge_base: KnowledgeBase,
    responder: Option<DynResponder>,
    fallback: Arc<FallbackProvider>,
    policy: InvokePolicy,
    sticky: StickyFallback,
    top_k: usize,
    min_similarity: f32,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("knowledge_base", &self.knowledge_base)
            .field("mode", &self.sticky.mode())
            .field("top_k", &self.top_k)
            .field("min_similarity", &self.min_similarity)
            .finish()
    }
}

impl RetrievalEngine {
    pub fn new(
        knowledge_base: KnowledgeBase,
        responder: DynResponder,
        fallback: Arc<FallbackProvider>,
    ) -> Self {
        Self {
            knowledge_base,
            responder: Some(responder),
            fallback,
            policy: InvokePolicy::default(),
            sticky: StickyFallback::new("answering"),
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    /// Engine without a responder; answers come from the canned table only
    pub fn fallback_only(
        knowledge_base: KnowledgeBase,
        fallback: Arc<FallbackProvider>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            knowledge_base,
            responder: None,
            fallback,
            policy: InvokePolicy::default(),
            sticky: StickyFallback::tripped("answering", reason),
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    pub fn with_policy(mut self, policy: InvokePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn mode(&self) -> StageMode {
        self.sticky.mode()
    }

    /// Answer one query and describe how it was answered
    pub async fn answer(&self, query: &str) -> (String, QueryRecord) {
        let query = query.trim();
        let hits = self.retrieve(query).await;
        let retrieved: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();

        match self.generate(query, &retrieved).await {
            Ok(text) => {
                info!(hits = retrieved.len(), via = %AnsweredVia::Primary, "Query answered");
                let record = QueryRecord::new(query, retrieved, text.clone(), AnsweredVia::Primary);
                return (text, record);
            }
            Err(err) => debug!(error = %err, "No grounded answer, consulting canned answers"),
        }

        let (text, via) = match self.fallback.lookup_answer(query) {
            Ok(canned) => (canned.answer.clone(), AnsweredVia::Fallback),
            Err(_) => (INSUFFICIENT_DATA.to_string(), AnsweredVia::Insufficient),
        };
        info!(hits = retrieved.len(), via = %via, "Query answered");
        let record = QueryRecord::new(query, retrieved, text.clone(), via);
        (text, record)
    }

    /// Top-k records above the similarity floor; empty when embedding fails
    async fn retrieve(&self, query: &str) -> Vec<(String, f32)> {
        if self.knowledge_base.is_empty() {
            return Vec::new();
        }
        let vector = match self.knowledge_base.embed_query(query).await {
            Ok(vector) => vector,
            Err(failure) => {
                warn!(failure = %failure, "Query embedding failed, continuing without context");
                return Vec::new();
            }
        };

        self.knowledge_base
            .search(&vector, self.top_k)
            .into_iter()
            .filter(|(_, score)| *score >= self.min_similarity)
            .collect()
    }

    async fn generate(&self, query: &str, retrieved: &[String]) -> Result<String> {
        if retrieved.is_empty() {
            return Err(Error::InsufficientContext(query.to_string()));
        }
        let Some(responder) = self.responder.as_ref().filter(|_| !self.sticky.is_tripped()) else {
            return Err(Error::Other(format!("responder in {} mode", self.sticky.mode())));
        };

        let context = retrieved
            .iter()
            .filter_map(|id| self.knowledge_base.get(id))
            .map(|record| record.document_text())
            .collect::<Vec<_>>()
            .join("\n\n");
        let request = AnswerRequest {
            query: query.to_string(),
            context,
        };

        match self.policy.call(responder.as_ref(), &request).await {
            Ok(text) if text.trim() == INSUFFICIENT_DATA => {
                Err(Error::InsufficientContext(query.to_string()))
            }
            Ok(text) => Ok(text),
            Err(failure) => {
                warn!(failure = %failure, "Responder failed, using canned answers");
                if failure.is_sticky() {
                    self.sticky.trip(failure.to_string());
                }
                Err(Error::Capability(responder.name().to_string(), failure))
            }
        }
    }
}
