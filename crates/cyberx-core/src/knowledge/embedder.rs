//! Embedding collaborators
//!
//! The knowledge base only owns the index; turning text into vectors is
//! delegated to an [`Embedder`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::capability::{Failure, InvokePolicy};
use crate::llm::LlmClient;

/// Text-to-vector capability
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, Failure>;
}

/// Deterministic feature-hashing embedder
///
/// Hashes terms into fixed-dimension buckets weighted by term frequency and an
/// inverse-length IDF approximation, then L2-normalizes. Always available.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// FNV-1a bucket for a term
    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(|s| s.to_lowercase())
            .collect()
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return vec;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in tf {
            let idf = 1.0 + (term.len() as f32).ln();
            vec[Self::bucket(term, self.dimensions)] += (count / total) * idf;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, Failure> {
        Ok(self.vectorize(text))
    }
}

/// Embedder backed by the embeddings endpoint of the LLM API
#[derive(Debug, Clone)]
pub struct RemoteEmbedder {
    client: LlmClient,
    model: String,
    dimensions: Option<usize>,
    policy: InvokePolicy,
}

impl RemoteEmbedder {
    pub fn new(client: LlmClient, model: impl Into<String>, policy: InvokePolicy) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions: None,
            policy,
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn name(&self) -> &str {
        "remote"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, Failure> {
        self.policy
            .run("embeddings", || self.client.embed(text, &self.model, self.dimensions))
            .await
    }
}
