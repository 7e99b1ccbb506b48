//! Lexical ranking over the chunk index

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, instrument};

use super::index::{Chunk, KnowledgeIndex};
use super::{Fragment, Retriever};

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "to", "of", "in", "for",
        "on", "with", "at", "by", "from", "as", "into", "and", "or", "but", "if", "then",
        "so", "than", "this", "that", "these", "those", "it", "its", "do", "does", "did",
        "can", "could", "should", "would", "will", "how", "what", "which", "who", "when",
        "where", "why", "me", "my", "we", "our", "you", "your", "i", "some", "any", "all",
        "no", "not", "use", "using", "make", "create", "example", "examples", "please", "want",
        "need", "show", "give",
    ]
    .into_iter()
    .collect()
});

/// Lowercased search terms of `text`.
///
/// Compound identifiers (`aws_s3_bucket`) yield the whole token and each part.
pub fn extract_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let lowered = text.to_lowercase();
    for token in lowered.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-') {
        push_term(&mut terms, token);
        if token.contains(['_', '-']) {
            for part in token.split(['_', '-']) {
                push_term(&mut terms, part);
            }
        }
    }
    terms
}

fn push_term(terms: &mut Vec<String>, token: &str) {
    if token.chars().count() >= 2 && !STOP_WORDS.contains(token) {
        terms.push(token.to_string());
    }
}

/// Unique query keywords in order of first appearance
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    extract_terms(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// TF-IDF keyword ranking over an in-memory chunk list
#[derive(Debug, Default)]
pub struct LexicalRetriever {
    chunks: Vec<Chunk>,
    term_counts: Vec<HashMap<String, usize>>,
    doc_freq: HashMap<String, usize>,
}

impl LexicalRetriever {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let term_counts: Vec<HashMap<String, usize>> = chunks
            .iter()
            .map(|chunk| {
                let mut counts = HashMap::new();
                for term in extract_terms(&chunk.text) {
                    *counts.entry(term).or_insert(0) += 1;
                }
                for term in counts.keys() {
                    *doc_freq.entry(term.clone()).or_insert(0) += 1;
                }
                counts
            })
            .collect();

        Self {
            chunks,
            term_counts,
            doc_freq,
        }
    }

    pub fn from_index(index: KnowledgeIndex) -> Self {
        Self::new(index.chunks)
    }

    /// Load a persisted index
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_index(KnowledgeIndex::load(path)?))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.chunks.len() as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        ((n + 1.0) / (df + 1.0)).ln() + 1.0
    }

    /// Ranked matches; ties keep index order, chunks with no overlap are dropped
    pub fn rank(&self, query: &str, k: usize) -> Vec<Fragment> {
        let keywords = extract_keywords(query);
        if keywords.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .term_counts
            .iter()
            .enumerate()
            .filter_map(|(i, counts)| {
                let score: f32 = keywords
                    .iter()
                    .filter_map(|kw| {
                        counts
                            .get(kw)
                            .map(|&tf| (1.0 + (tf as f32).ln()) * self.idf(kw))
                    })
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        // Stable sort keeps index order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| Fragment {
                source: self.chunks[i].source.clone(),
                text: self.chunks[i].text.clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    #[instrument(skip(self), fields(chunks = self.chunks.len()))]
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Fragment>> {
        let fragments = self.rank(query, k);
        debug!(matches = fragments.len(), "Retrieved fragments");
        Ok(fragments)
    }
}
