//! Semantic ranking with local sentence embeddings
//!
//! Only compiled with the `embeddings` feature. Chunk vectors are computed once
//! when the retriever is built; each query costs one embedding call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info, instrument};

use super::index::{Chunk, KnowledgeIndex};
use super::{Fragment, Retriever};

/// Sentence-transformers model used for both chunks and queries
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Chunks embedded per model call while building
const BATCH_SIZE: usize = 64;

/// Cosine similarity search over embedded chunks
pub struct EmbeddingRetriever {
    model: TextEmbedding,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingRetriever {
    /// Load the model (downloaded on first use) and embed every chunk of `index`
    pub fn new(index: KnowledgeIndex) -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .with_context(|| format!("Failed to load embedding model {}", DEFAULT_MODEL))?;

        let texts: Vec<&str> = index.chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            model
                .embed(texts, Some(BATCH_SIZE))
                .context("Failed to embed knowledge chunks")?
        };
        info!(model = DEFAULT_MODEL, chunks = vectors.len(), "Embedded knowledge index");

        Ok(Self {
            model,
            chunks: index.chunks,
            vectors,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .model
            .embed(vec![query], None)
            .context("Failed to embed query")?;
        vectors.pop().context("Embedding model returned no vector")
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    #[instrument(skip(self), fields(chunks = self.chunks.len()))]
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Fragment>> {
        if query.trim().is_empty() || k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(query)?;

        let fragments: Vec<Fragment> = rank_by_similarity(&query_vector, &self.vectors, k)
            .into_iter()
            .map(|(i, score)| Fragment {
                source: self.chunks[i].source.clone(),
                text: self.chunks[i].text.clone(),
                score,
            })
            .collect();
        debug!(matches = fragments.len(), "Retrieved fragments");
        Ok(fragments)
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Indices of the `k` most similar vectors, best first; ties keep index order
pub fn rank_by_similarity(query: &[f32], vectors: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    if query.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let x = [1.0, 0.0, 0.0];
        assert!((cosine_similarity(&x, &[2.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&x, &[0.0, 1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_similarity(&x, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_by_similarity() {
        let vectors = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.1],
            vec![1.0, 0.1],
            vec![-1.0, 0.0],
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], &vectors, 2);

        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2]);
        assert!(ranked[0].1 > 0.99);

        assert_eq!(rank_by_similarity(&[1.0, 0.0], &vectors, 10).len(), 4);
        assert!(rank_by_similarity(&[], &vectors, 2).is_empty());
    }
}
