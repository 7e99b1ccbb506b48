//! Knowledge base: chunk index over example Terraform code and its retrievers
//!
//! Ranking is lexical (TF-IDF) by default. Building with the `embeddings` feature
//! adds semantic ranking with a local sentence-embedding model.

#[cfg(feature = "embeddings")]
mod embedding;
mod index;
mod retriever;

#[cfg(feature = "embeddings")]
pub use embedding::EmbeddingRetriever;
pub use index::{Chunk, KnowledgeIndex};
pub use retriever::LexicalRetriever;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// A ranked match returned by a retriever
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub source: PathBuf,
    pub text: String,
    pub score: f32,
}

/// Similarity search over the knowledge index
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Best `k` fragments for `query`, most relevant first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Fragment>>;
}
