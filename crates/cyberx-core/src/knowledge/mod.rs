//! Knowledge base - embedding index over intelligence records
//!
//! Append-only: records are never removed. Re-adding a `record_id` overwrites
//! its record and embedding in place, keeping the first insertion slot so
//! tie-breaking stays stable.

mod embedder;

pub use embedder::{Embedder, HashingEmbedder, RemoteEmbedder};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::Failure;
use crate::error::{Error, Result};
use crate::models::{EmbeddingEntry, IntelligenceRecord};

struct IndexedRecord {
    record: IntelligenceRecord,
    embedding: EmbeddingEntry,
}

/// In-memory similarity index owned by one run
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexedRecord>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("embedder", &self.embedder.name())
            .field("entries", &self.entries.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Vec::new(),
            positions: HashMap::new(),
            dimension: None,
        }
    }

    /// Embed and index a record
    ///
    /// On embedding failure the record is left out of the index and the error
    /// is returned to the caller.
    pub async fn add(&mut self, record: IntelligenceRecord) -> Result<()> {
        let vector = self
            .embedder
            .embed(&record.document_text())
            .await
            .map_err(|failure| {
                Error::EmbeddingFailed(format!("{}: {}", record.record_id(), failure))
            })?;
        self.insert_embedded(record, vector)
    }

    /// Index a record with a vector computed elsewhere
    pub fn insert_embedded(&mut self, record: IntelligenceRecord, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::EmbeddingFailed(format!(
                "{}: empty vector",
                record.record_id()
            )));
        }
        if let Some(expected) = self.dimension {
            if expected != vector.len() {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        self.dimension = Some(vector.len());

        let record_id = record.record_id().to_string();
        let embedding = EmbeddingEntry::new(record_id.clone(), vector);
        match self.positions.get(&record_id) {
            Some(&pos) => {
                debug!(record_id = %record_id, "Overwriting existing embedding");
                self.entries[pos] = IndexedRecord { record, embedding };
            }
            None => {
                self.positions.insert(record_id, self.entries.len());
                self.entries.push(IndexedRecord { record, embedding });
            }
        }
        Ok(())
    }

    /// Embed query text with the same collaborator used for indexing
    pub async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, Failure> {
        self.embedder.embed(text).await
    }

    /// Top-`k` records by cosine similarity, best first
    ///
    /// Ties keep insertion order (earliest wins). A query of the wrong
    /// dimension matches nothing.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<(String, f32)> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        if self.dimension != Some(query_vector.len()) {
            warn!(
                expected = ?self.dimension,
                actual = query_vector.len(),
                "Query vector dimension does not match index"
            );
            return Vec::new();
        }

        let mut ranked: Vec<(String, f32)> = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.embedding.record_id.clone(),
                    cosine_similarity(query_vector, &e.embedding.vector),
                )
            })
            .collect();

        // sort_by is stable, which gives the insertion-order tie break
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);
        ranked
    }

    pub fn get(&self, record_id: &str) -> Option<&IntelligenceRecord> {
        self.positions.get(record_id).map(|&pos| &self.entries[pos].record)
    }

    pub fn embedding(&self, record_id: &str) -> Option<&EmbeddingEntry> {
        self.positions
            .get(record_id)
            .map(|&pos| &self.entries[pos].embedding)
    }

    /// Records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &IntelligenceRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// Cosine similarity in [-1, 1]; zero vectors and length mismatches give 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;

    fn record(actor: &str, nexus: &str, summary: &str) -> IntelligenceRecord {
        IntelligenceRecord::new(actor, nexus, summary, ["test"], Provenance::Primary, "src-test")
            .unwrap()
    }

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new(Arc::new(HashingEmbedder::default()))
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_descending() {
        let mut kb = kb();
        kb.insert_embedded(record("A", "X", "a"), vec![1.0, 0.0, 0.0]).unwrap();
        kb.insert_embedded(record("B", "X", "b"), vec![0.6, 0.8, 0.0]).unwrap();
        kb.insert_embedded(record("C", "X", "c"), vec![0.0, 0.0, 1.0]).unwrap();

        let results = kb.search(&[0.0, 1.0, 0.0], 3);
        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(kb.get(&results[0].0).unwrap().actor_name(), "B");
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let mut kb = kb();
        let first = record("First", "X", "s");
        let second = record("Second", "X", "s");
        let first_id = first.record_id().to_string();
        let second_id = second.record_id().to_string();
        kb.insert_embedded(first, vec![1.0, 1.0]).unwrap();
        kb.insert_embedded(second, vec![1.0, 1.0]).unwrap();

        let results = kb.search(&[1.0, 1.0], 2);
        assert_eq!(results[0].0, first_id);
        assert_eq!(results[1].0, second_id);
    }

    #[test]
    fn test_search_respects_k() {
        let mut kb = kb();
        for i in 0..5 {
            kb.insert_embedded(record(&format!("A{i}"), "X", "s"), vec![1.0, i as f32])
                .unwrap();
        }
        assert_eq!(kb.search(&[1.0, 0.0], 2).len(), 2);
        assert!(kb.search(&[1.0, 0.0], 0).is_empty());
        assert_eq!(kb.search(&[1.0, 0.0], 50).len(), 5);
    }

    #[test]
    fn test_readding_same_id_overwrites() {
        let mut kb = kb();
        let rec = record("APT31", "China", "s");
        let id = rec.record_id().to_string();
        kb.insert_embedded(rec.clone(), vec![1.0, 0.0]).unwrap();
        kb.insert_embedded(record("Other", "X", "s"), vec![0.5, 0.5]).unwrap();
        kb.insert_embedded(rec, vec![0.0, 1.0]).unwrap();

        assert_eq!(kb.len(), 2);
        assert_eq!(kb.embedding(&id).unwrap().vector, vec![0.0, 1.0]);
        assert_eq!(kb.records().next().unwrap().record_id(), id);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut kb = kb();
        kb.insert_embedded(record("A", "X", "s"), vec![1.0, 0.0]).unwrap();
        let err = kb.insert_embedded(record("B", "X", "s"), vec![1.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(kb.search(&[1.0], 3).is_empty());
    }

    #[test]
    fn test_search_does_not_mutate() {
        let mut kb = kb();
        kb.insert_embedded(record("A", "X", "s"), vec![1.0, 0.0]).unwrap();
        let before = kb.len();
        let _ = kb.search(&[1.0, 0.0], 1);
        assert_eq!(kb.len(), before);
    }

    #[tokio::test]
    async fn test_self_similarity_roundtrip() {
        let mut kb = kb();
        let target = record(
            "APT31",
            "China",
            "Stealthy attacks on Russian IT firms using CloudyLoader",
        );
        let target_id = target.record_id().to_string();
        let text = target.document_text();
        kb.add(target).await.unwrap();
        kb.add(record("Charon", "Unknown", "Ransomware hitting the Middle East")).await.unwrap();

        let query = kb.embed_query(&text).await.unwrap();
        let results = kb.search(&query, 1);
        assert_eq!(results[0].0, target_id);
        assert!((results[0].1 - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_add_reports_embedding_failure() {
        struct Broken;

        #[async_trait::async_trait]
        impl Embedder for Broken {
            fn name(&self) -> &str {
                "broken"
            }

            async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, Failure> {
                Err(Failure::Unreachable("model offline".into()))
            }
        }

        let mut kb = KnowledgeBase::new(Arc::new(Broken));
        let err = kb.add(record("A", "X", "s")).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailed(_)));
        assert!(kb.is_empty());
    }
}
