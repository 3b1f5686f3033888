//! In-memory vector index with brute-force cosine ranking. Used by tests
//! and as the ingestion target for single-node deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use super::VectorIndex;
use crate::error::EngineError;
use crate::types::RetrievedChunk;

struct SeededChunk {
    text: String,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct MemoryVectorIndex {
    namespaces: DashMap<String, Vec<SeededChunk>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one embedded chunk to a namespace, creating it if needed.
    pub fn seed(&self, namespace: &str, text: &str, vector: Vec<f32>) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .push(SeededChunk {
                text: text.to_string(),
                vector,
            });
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn similarity_search(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, EngineError> {
        let chunks = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| EngineError::Retrieval(format!("unknown namespace {:?}", namespace)))?;

        let mut scored: Vec<RetrievedChunk> = chunks
            .iter()
            .map(|c| RetrievedChunk {
                text: c.text.clone(),
                score: cosine_similarity(vector, &c.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), EngineError> {
        self.namespaces.remove(namespace);
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
