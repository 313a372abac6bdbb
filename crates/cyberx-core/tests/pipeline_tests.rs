//! CyberX Core Integration Tests
//!
//! Runs whole sessions with scripted capability clients and checks the
//! resulting execution log on disk.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use cyberx_core::capability::{
    AnswerRequest, CapabilityClient, CollectRequest, ExtractRequest, ExtractedFields, Failure,
    InvokePolicy, RawDocument,
};
use cyberx_core::prelude::{
    AnsweredVia, AuditLogger, Embedder, ExtractionEngine, FallbackProvider, HashingEmbedder,
    INSUFFICIENT_DATA, KnowledgeBase, Provenance, QueryOutcome, SessionController,
    SourceCollector, StageMode,
};

fn fast() -> InvokePolicy {
    InvokePolicy::new(Duration::from_secs(5), Duration::from_millis(1))
}

/// Serves an article whose title names the actor in the topic's last path segment
struct ScriptedCollector {
    unreachable: &'static [&'static str],
}

#[async_trait]
impl CapabilityClient for ScriptedCollector {
    type Request = CollectRequest;
    type Response = RawDocument;

    fn name(&self) -> &str {
        "scripted-collector"
    }

    async fn invoke(&self, request: &CollectRequest) -> Result<RawDocument, Failure> {
        if self.unreachable.iter().any(|t| request.topic.ends_with(t)) {
            return Err(Failure::Unreachable("connection refused".into()));
        }
        let actor = request.topic.rsplit('/').next().unwrap_or_default();
        Ok(RawDocument {
            title: format!("{} resurfaces", actor),
            body_text: format!("{} was observed in a China-nexus espionage campaign.", actor),
        })
    }
}

/// Reads the actor back out of the title
struct ScriptedExtractor {
    quota_after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl CapabilityClient for ScriptedExtractor {
    type Request = ExtractRequest;
    type Response = ExtractedFields;

    fn name(&self) -> &str {
        "scripted-extractor"
    }

    async fn invoke(&self, request: &ExtractRequest) -> Result<ExtractedFields, Failure> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.quota_after {
            return Err(Failure::QuotaExceeded("429 Too Many Requests".into()));
        }
        let actor = request.title.split_whitespace().next().unwrap_or_default();
        Ok(ExtractedFields {
            actor_name: actor.to_string(),
            nexus: "China".to_string(),
            summary: request.body_text.clone(),
            tags: vec!["espionage".to_string()],
        })
    }
}

struct EchoResponder;

#[async_trait]
impl CapabilityClient for EchoResponder {
    type Request = AnswerRequest;
    type Response = String;

    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, request: &AnswerRequest) -> Result<String, Failure> {
        Ok(format!("Based on the context: {}", request.context.replace('\n', " ")))
    }
}

fn read_artifact(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_live_session_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = Arc::new(FallbackProvider::default());

    let collector = SourceCollector::new(
        Arc::new(ScriptedCollector { unreachable: &[] }),
        fallback.clone(),
    )
    .with_policy(fast());
    let extractor = ExtractionEngine::new(
        Arc::new(ScriptedExtractor {
            quota_after: usize::MAX,
            calls: AtomicUsize::new(0),
        }),
        fallback.clone(),
    )
    .with_policy(fast());

    let mut session = SessionController::builder()
        .topics(["https://news.example/APT31", "https://news.example/Volt"])
        .max_reports(5)
        .collector(collector)
        .extractor(extractor)
        .knowledge_base(KnowledgeBase::new(Arc::new(HashingEmbedder::default())))
        .responder(Arc::new(EchoResponder))
        .retrieval_policy(fast())
        .fallback(fallback)
        .audit(AuditLogger::new(dir.path(), "CyberX").unwrap())
        .build()
        .unwrap();

    let summary = session.run_pipeline().await.unwrap();
    assert_eq!(summary.collection.primary, 2);
    assert_eq!(summary.extraction.primary, 2);
    assert_eq!(summary.indexed, 2);

    let outcome = session.submit("Which threat actors are China-nexus?").await.unwrap();
    match outcome {
        QueryOutcome::Answered { text, via } => {
            assert!(matches!(via, AnsweredVia::Primary | AnsweredVia::Fallback));
            assert_ne!(text, INSUFFICIENT_DATA);
        }
        other => panic!("expected an answer, got {:?}", other),
    }
    assert_eq!(session.submit("quit").await.unwrap(), QueryOutcome::Terminated);

    let artifact = session.close().unwrap();
    let log = read_artifact(&artifact.path);
    assert_eq!(log["version"], 1);
    let phases: Vec<&str> = log["phases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(phases, vec!["collection", "extraction", "indexing", "querying"]);
    assert_eq!(log["phases"][0]["status"], "completed");
    assert_eq!(log["reports"].as_array().unwrap().len(), 2);
    assert_eq!(log["records"][0]["actor_name"], "APT31");
    assert_eq!(log["queries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_degraded_session_is_tagged_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = Arc::new(FallbackProvider::default());

    let collector = SourceCollector::new(
        Arc::new(ScriptedCollector {
            unreachable: &["charon-ransomware-hits-middle-east"],
        }),
        fallback.clone(),
    )
    .with_policy(fast());
    let extractor = ExtractionEngine::new(
        Arc::new(ScriptedExtractor {
            quota_after: 0,
            calls: AtomicUsize::new(0),
        }),
        fallback.clone(),
    )
    .with_policy(fast());

    let mut session = SessionController::builder()
        .topics([
            "https://news.example/Warp Panda",
            "https://news.example/charon-ransomware-hits-middle-east",
            "https://news.example/Warp Panda",
        ])
        .collector(collector)
        .extractor(extractor)
        .knowledge_base(KnowledgeBase::new(Arc::new(HashingEmbedder::default())))
        .responder_unavailable("EXTRACTION_API_KEY not set")
        .fallback(fallback)
        .audit(AuditLogger::new(dir.path(), "CyberX").unwrap())
        .build()
        .unwrap();

    let summary = session.run_pipeline().await.unwrap();
    assert_eq!(summary.collection.primary, 1);
    assert_eq!(summary.collection.fallback, 1);
    assert!(matches!(summary.extraction.mode, StageMode::Fallback(_)));
    assert_eq!(summary.extraction.fallback, 2);

    let kb = session.knowledge_base().unwrap();
    let actors: HashSet<&str> = kb.records().map(|r| r.actor_name()).collect();
    assert_eq!(actors, HashSet::from(["Warp Panda", "Charon"]));
    assert!(kb.records().all(|r| r.extracted_via() == Provenance::Fallback));

    let artifact = session.close().unwrap();
    let log = read_artifact(&artifact.path);
    assert_eq!(log["phases"][0]["status"], "degraded");
    assert_eq!(log["phases"][0]["detail"]["failures"][0]["failure"]["kind"], "unreachable");
    assert_eq!(log["phases"][1]["status"], "degraded");
    assert_eq!(log["reports"][1]["collected_via"], "fallback");
}

#[tokio::test]
async fn test_unindexable_records_leave_only_canned_answers() {
    struct Offline;

    #[async_trait]
    impl Embedder for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, Failure> {
            Err(Failure::Unreachable("embedding model offline".into()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut session = SessionController::builder()
        .topics(["https://news.example/apt41-phishing"])
        .knowledge_base(KnowledgeBase::new(Arc::new(Offline)))
        .fallback(Arc::new(FallbackProvider::default()))
        .audit(AuditLogger::new(dir.path(), "CyberX").unwrap())
        .build()
        .unwrap();

    let summary = session.run_pipeline().await.unwrap();
    assert_eq!(summary.indexed, 0);
    assert_eq!(summary.index_failures, 1);

    let answer = session.submit("What should I cook tonight?").await.unwrap();
    assert_eq!(
        answer,
        QueryOutcome::Answered {
            text: INSUFFICIENT_DATA.to_string(),
            via: AnsweredVia::Insufficient,
        }
    );

    let answer = session.submit("recent activities of medusa").await.unwrap();
    assert!(matches!(
        answer,
        QueryOutcome::Answered {
            via: AnsweredVia::Fallback,
            ..
        }
    ));

    let log = read_artifact(&session.close().unwrap().path);
    assert_eq!(log["phases"][2]["status"], "failed");
    assert_eq!(log["queries"][0]["answered_via"], "insufficient");
}

#[tokio::test]
async fn test_versions_increase_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut versions = Vec::new();

    for _ in 0..3 {
        let mut session = SessionController::builder()
            .topics(["https://news.example/storm-0249"])
            .knowledge_base(KnowledgeBase::new(Arc::new(HashingEmbedder::default())))
            .fallback(Arc::new(FallbackProvider::default()))
            .audit(AuditLogger::new(dir.path(), "CyberX").unwrap())
            .build()
            .unwrap();
        session.run_pipeline().await.unwrap();
        versions.push(session.close().unwrap().version);
    }

    assert_eq!(versions, vec![1, 2, 3]);
    assert!(dir.path().join("CyberX #3.json").exists());
}
