//! CyberX Core Library
//!
//! Threat-intelligence pipeline that keeps answering when its external
//! services do not. Reports are collected, turned into structured records,
//! indexed by embedding, and queried through retrieval-augmented answering.
//! Every stage degrades to a deterministic fallback provider and tags its
//! output with where it came from.
//!
//! # Architecture
//!
//! - **capability**: uniform service calls with tagged failures and the bounded retry policy
//! - **collector** / **extraction** / **retrieval**: the three orchestrated stages
//! - **knowledge**: embedding index with cosine search
//! - **fallback**: curated substitute data
//! - **session**: the run state machine
//! - **audit**: versioned, write-once execution logs

pub mod audit;
pub mod capability;
pub mod collector;
pub mod config;
pub mod error;
pub mod extraction;
pub mod fallback;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod session;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{AuditLogger, PersistedArtifact, PhaseStatus};
    pub use crate::capability::{CapabilityClient, Failure, InvokePolicy, StageMode};
    pub use crate::collector::{ScrapeClient, SourceCollector};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::extraction::{ExtractionEngine, LlmExtractor};
    pub use crate::fallback::FallbackProvider;
    pub use crate::knowledge::{Embedder, HashingEmbedder, KnowledgeBase, RemoteEmbedder};
    pub use crate::llm::LlmClient;
    pub use crate::models::{AnsweredVia, IntelligenceRecord, Provenance, QueryRecord, ThreatReport};
    pub use crate::retrieval::{INSUFFICIENT_DATA, LlmResponder, RetrievalEngine};
    pub use crate::session::{QueryOutcome, SessionController, SessionState};
}
