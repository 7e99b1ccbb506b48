//! Persisted chunk index built from the Terraform examples directory

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const INDEX_VERSION: u32 = 1;

/// Separator used both to split documents and to re-join merged paragraphs
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// One retrievable piece of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Document the chunk was cut from
    pub source: PathBuf,
    pub text: String,
}

/// Counts reported after a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    /// Files skipped because they could not be read as text
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    version: u32,
    pub built_at: DateTime<Utc>,
    pub chunk_size: usize,
    pub chunks: Vec<Chunk>,
}

impl KnowledgeIndex {
    pub fn new(chunk_size: usize, chunks: Vec<Chunk>) -> Self {
        Self {
            version: INDEX_VERSION,
            built_at: Utc::now(),
            chunk_size,
            chunks,
        }
    }

    /// Walk `docs_dir` and chunk every readable text file
    pub fn build(docs_dir: &Path, chunk_size: usize) -> Result<(Self, BuildStats)> {
        if !docs_dir.is_dir() {
            bail!("Documents directory not found: {}", docs_dir.display());
        }
        let chunk_size = chunk_size.max(1);

        let mut stats = BuildStats::default();
        let mut chunks = Vec::new();

        for entry in WalkDir::new(docs_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    stats.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let content = match fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping non-text file");
                    stats.skipped += 1;
                    continue;
                }
            };

            stats.documents += 1;
            for text in split_text(&content, chunk_size) {
                chunks.push(Chunk {
                    source: entry.path().to_path_buf(),
                    text,
                });
            }
        }

        stats.chunks = chunks.len();
        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            skipped = stats.skipped,
            "Built knowledge index"
        );
        Ok((Self::new(chunk_size, chunks), stats))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge index {}", path.display()))?;
        let index: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse knowledge index {}", path.display()))?;
        if index.version != INDEX_VERSION {
            bail!(
                "Knowledge index {} has version {}, expected {}; rebuild it with `infra-agent index`",
                path.display(),
                index.version,
                INDEX_VERSION
            );
        }
        debug!(chunks = index.chunks.len(), path = %path.display(), "Loaded knowledge index");
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write knowledge index {}", path.display()))?;
        debug!(chunks = self.chunks.len(), path = %path.display(), "Saved knowledge index");
        Ok(())
    }
}

/// Split on blank lines, then merge paragraphs into chunks of at most `chunk_size` chars.
///
/// A paragraph longer than `chunk_size` is kept whole as its own chunk.
pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in normalized
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let len = piece.chars().count();
        if len > chunk_size {
            warn!(len, chunk_size, "Paragraph exceeds chunk size");
        }

        if !current.is_empty() && current_len + PARAGRAPH_SEPARATOR.len() + len > chunk_size {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str(PARAGRAPH_SEPARATOR);
            current_len += PARAGRAPH_SEPARATOR.len();
        }
        current.push_str(piece);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_merges_small_paragraphs() {
        let text = "alpha\n\nbeta\n\ngamma";
        assert_eq!(split_text(text, 100), vec!["alpha\n\nbeta\n\ngamma"]);
    }

    #[test]
    fn test_split_respects_chunk_size() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        // "aaaa\n\nbbbb" is 10 chars
        assert_eq!(split_text(text, 10), vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(split_text(text, 9), vec!["aaaa", "bbbb", "cccc"]);
    }

    #[test]
    fn test_split_keeps_oversized_paragraph_whole() {
        let long = "x".repeat(30);
        let text = format!("short\n\n{}\n\ntail", long);
        assert_eq!(split_text(&text, 10), vec!["short".to_string(), long, "tail".to_string()]);
    }

    #[test]
    fn test_split_ignores_blank_runs_and_crlf() {
        let text = "\r\n\r\nfirst\r\n\r\n\n\n   \n\nsecond\n";
        assert_eq!(split_text(text, 5), vec!["first", "second"]);
    }

    #[test]
    fn test_build_save_load() {
        let docs = TempDir::new().unwrap();
        fs::write(
            docs.path().join("s3.tf"),
            "resource \"aws_s3_bucket\" \"b\" {\n  bucket = \"b\"\n}\n\nresource \"aws_s3_bucket_versioning\" \"v\" {}\n",
        )
        .unwrap();
        fs::create_dir(docs.path().join("nested")).unwrap();
        fs::write(docs.path().join("nested").join("rules.txt"), "Always tag resources.").unwrap();
        fs::write(docs.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

        let (index, stats) = KnowledgeIndex::build(docs.path(), 500).unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.chunks, 2);
        assert!(index.chunks.iter().any(|c| c.source.ends_with("rules.txt")));

        let out = TempDir::new().unwrap();
        let path = out.path().join("index").join("knowledge_index.json");
        index.save(&path).unwrap();

        let loaded = KnowledgeIndex::load(&path).unwrap();
        assert_eq!(loaded.chunks, index.chunks);
        assert_eq!(loaded.chunk_size, 500);
    }

    #[test]
    fn test_build_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(KnowledgeIndex::build(&dir.path().join("missing"), 500).is_err());
    }
}
