//! Capability clients - uniform wrappers around external service calls
//!
//! Every stage of the pipeline (collection, extraction, answering) talks to its
//! external service through [`CapabilityClient`]. A call either returns a
//! response or a tagged [`Failure`]; the orchestrating component decides what
//! to do with the failure. Clients never retry on their own: the single bounded
//! reattempt lives in [`InvokePolicy`].

mod policy;
mod sticky;

pub use policy::InvokePolicy;
pub use sticky::{StageMode, StickyFallback};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tagged failure of a single capability call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Failure {
    /// The service signalled that our quota or credentials are exhausted
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    /// The service could not be reached or timed out
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The service answered with something we cannot use
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Failure {
    /// Whether this failure should switch the stage to fallback for the rest of the run
    pub fn is_sticky(&self) -> bool {
        matches!(self, Failure::QuotaExceeded(_))
    }

    /// Short machine-friendly tag, used in audit details
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::QuotaExceeded(_) => "quota_exceeded",
            Failure::Unreachable(_) => "unreachable",
            Failure::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Classify an HTTP status code returned by a service
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 402 | 403 | 429 => Failure::QuotaExceeded(format!("HTTP {}: {}", status, body)),
            408 | 500..=599 => Failure::Unreachable(format!("HTTP {}: {}", status, body)),
            _ => Failure::InvalidResponse(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Failure::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Failure::from_status(status.as_u16(), &err.to_string())
        } else {
            Failure::Unreachable(err.to_string())
        }
    }
}

/// One external service call with quota/failure detection
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    type Request: Send + Sync;
    type Response: Send;

    /// Name used in logs and audit records
    fn name(&self) -> &str;

    /// Perform exactly one call against the service
    async fn invoke(&self, request: &Self::Request) -> Result<Self::Response, Failure>;
}

/// Request sent to a collector: one topic (usually an article URL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRequest {
    pub topic: String,
}

/// Raw document returned by a collector before it becomes a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub title: String,
    pub body_text: String,
}

/// Request sent to an extractor
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub title: String,
    pub body_text: String,
}

/// Structured fields returned by the extractor, before validation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default, alias = "actor")]
    pub actor_name: String,
    #[serde(default, alias = "country")]
    pub nexus: String,
    #[serde(default, alias = "activity_summary")]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request sent to a responder: the question and the retrieved context
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub query: String,
    pub context: String,
}

pub type DynCollector = Arc<dyn CapabilityClient<Request = CollectRequest, Response = RawDocument>>;
pub type DynExtractor =
    Arc<dyn CapabilityClient<Request = ExtractRequest, Response = ExtractedFields>>;
pub type DynResponder = Arc<dyn CapabilityClient<Request = AnswerRequest, Response = String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(Failure::from_status(429, ""), Failure::QuotaExceeded(_)));
        assert!(matches!(Failure::from_status(402, ""), Failure::QuotaExceeded(_)));
        assert!(matches!(Failure::from_status(503, ""), Failure::Unreachable(_)));
        assert!(matches!(Failure::from_status(404, ""), Failure::InvalidResponse(_)));
    }

    #[test]
    fn test_only_quota_is_sticky() {
        assert!(Failure::QuotaExceeded("x".into()).is_sticky());
        assert!(!Failure::Unreachable("x".into()).is_sticky());
        assert!(!Failure::InvalidResponse("x".into()).is_sticky());
    }

    #[test]
    fn test_extracted_fields_aliases() {
        let fields: ExtractedFields = serde_json::from_str(
            r#"{"actor": "APT31", "country": "China", "summary": "s", "tags": ["espionage"]}"#,
        )
        .unwrap();
        assert_eq!(fields.actor_name, "APT31");
        assert_eq!(fields.nexus, "China");
        assert_eq!(fields.tags, vec!["espionage"]);
    }

    #[test]
    fn test_failure_serializes_tagged() {
        let json = serde_json::to_string(&Failure::Unreachable("timeout".into())).unwrap();
        assert_eq!(json, r#"{"kind":"unreachable","message":"timeout"}"#);
    }
}
