//! Session wiring: builds the backend, sandbox, tools and agent from configuration

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use llm_core::{create_backend, Config, KnowledgeSettings};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{load_static_history, AgentConfig, AgentLoop, RunReport};
#[cfg(feature = "embeddings")]
use crate::knowledge::EmbeddingRetriever;
use crate::knowledge::{KnowledgeIndex, LexicalRetriever, Retriever};
use crate::sandbox::ExecutionSandbox;
use crate::tools::builtin::{create_default_registry, DuckDuckGoSearch};
use crate::tools::router::ToolRouter;
use crate::tools::security::TerminalConfirmation;

/// Command-line switches that shape a session
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Skip confirmation prompts for dangerous tools
    pub auto: bool,
    /// Do not print agent steps
    pub quiet: bool,
}

/// Everything needed to run goals against one deployment target
pub struct Session {
    config: Config,
    agent: AgentLoop,
    sandbox: Arc<ExecutionSandbox>,
    backend_name: String,
    knowledge_chunks: usize,
    has_rules: bool,
}

impl Session {
    pub fn build(config: Config, opts: SessionOptions) -> Result<Self> {
        let backend = create_backend(&config.model, config.api_key())
            .with_context(|| format!("Failed to set up {} backend", config.model.provider))?;
        let backend_name = backend.describe();

        let sandbox = Arc::new(ExecutionSandbox::from_settings(&config.sandbox)?);
        let index = load_index(&config.knowledge);
        let knowledge_chunks = index.chunks.len();
        let retriever = select_retriever(index);
        let search = Arc::new(DuckDuckGoSearch::new(Duration::from_secs(config.search.timeout_secs))?);

        let registry = create_default_registry(
            retriever,
            config.knowledge.top_k,
            sandbox.clone(),
            search,
            config.search.char_budget,
        )?;

        let confirmation = if opts.auto {
            TerminalConfirmation::auto()
        } else {
            TerminalConfirmation::new()
        };
        let router = Arc::new(ToolRouter::new(registry, confirmation));

        let history = load_static_history(&config.agent.rules_file);
        let has_rules = !history.is_empty();

        let agent_config = AgentConfig::from_settings(&config.agent)
            .with_model_timeout(model_timeout(&config))
            .with_tool_timeout(tool_timeout(&config))
            .with_chat_history(history)
            .with_auto_mode(opts.auto)
            .with_verbose(!opts.quiet);

        info!(
            backend = %backend_name,
            working_dir = %sandbox.working_dir().display(),
            knowledge_chunks,
            has_rules,
            "Session ready"
        );

        Ok(Self {
            agent: AgentLoop::new(backend, router, agent_config),
            config,
            sandbox,
            backend_name,
            knowledge_chunks,
            has_rules,
        })
    }

    /// Run one goal to completion
    pub async fn run_goal(&self, goal: &str, cancel: &CancellationToken) -> RunReport {
        self.agent.run(goal, cancel).await
    }

    /// Tear down everything in the sandbox working directory
    pub async fn destroy(&self) -> String {
        self.sandbox.destroy().await
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn sandbox(&self) -> &ExecutionSandbox {
        &self.sandbox
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn knowledge_chunks(&self) -> usize {
        self.knowledge_chunks
    }

    pub fn has_rules(&self) -> bool {
        self.has_rules
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.config.agent.cooldown_secs)
    }
}

/// Whole-call budget for the model: every attempt plus the backoff between them
fn model_timeout(config: &Config) -> Duration {
    let retries = u64::from(config.model.max_retries);
    let backoff = retries.saturating_mul(30);
    Duration::from_secs(
        config
            .model
            .timeout_secs
            .saturating_mul(retries.saturating_add(1))
            .saturating_add(backoff),
    )
}

/// init and apply are each bounded by the command timeout
fn tool_timeout(config: &Config) -> Duration {
    Duration::from_secs(
        config
            .sandbox
            .command_timeout_secs
            .saturating_mul(2)
            .saturating_add(60),
    )
}

/// Load the persisted index, or build one in memory when only the documents exist
fn load_index(settings: &KnowledgeSettings) -> KnowledgeIndex {
    match KnowledgeIndex::load(&settings.index_path) {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Knowledge index unavailable");
            match KnowledgeIndex::build(&settings.docs_dir, settings.chunk_size) {
                Ok((index, stats)) => {
                    info!(chunks = stats.chunks, "Using in-memory knowledge index; run `infra-agent index` to persist it");
                    index
                }
                Err(e) => {
                    warn!(error = %e, "No knowledge documents available");
                    KnowledgeIndex::new(settings.chunk_size, Vec::new())
                }
            }
        }
    }
}

/// Semantic ranking when compiled in and the model loads, keyword ranking otherwise
#[cfg(feature = "embeddings")]
fn select_retriever(index: KnowledgeIndex) -> Arc<dyn Retriever> {
    if index.chunks.is_empty() {
        return Arc::new(LexicalRetriever::from_index(index));
    }
    match EmbeddingRetriever::new(index.clone()) {
        Ok(retriever) => Arc::new(retriever),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Embedding model unavailable, falling back to keyword ranking");
            Arc::new(LexicalRetriever::from_index(index))
        }
    }
}

#[cfg(not(feature = "embeddings"))]
fn select_retriever(index: KnowledgeIndex) -> Arc<dyn Retriever> {
    Arc::new(LexicalRetriever::from_index(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Chunk;
    use llm_core::Provider;
    use tempfile::TempDir;

    #[test]
    fn test_model_timeout_covers_retries() {
        let mut config = Config::default();
        config.model.timeout_secs = 10;
        assert_eq!(model_timeout(&config), Duration::from_secs(10));

        config.model.max_retries = 2;
        assert_eq!(model_timeout(&config), Duration::from_secs(30 + 60));
    }

    #[test]
    fn test_timeouts_saturate_on_huge_settings() {
        let mut config = Config::default();
        config.sandbox.command_timeout_secs = 300;
        assert_eq!(tool_timeout(&config), Duration::from_secs(660));

        config.sandbox.command_timeout_secs = u64::MAX;
        config.model.timeout_secs = u64::MAX;
        config.model.max_retries = u32::MAX;
        assert_eq!(tool_timeout(&config), Duration::from_secs(u64::MAX));
        assert_eq!(model_timeout(&config), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_load_index_falls_back_to_docs() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("s3.tf"), "resource \"aws_s3_bucket\" \"b\" {}").unwrap();

        let settings = KnowledgeSettings {
            docs_dir: docs,
            index_path: dir.path().join("missing.json"),
            ..KnowledgeSettings::default()
        };
        assert_eq!(load_index(&settings).chunks.len(), 1);

        let settings = KnowledgeSettings {
            docs_dir: dir.path().join("nothing"),
            index_path: dir.path().join("missing.json"),
            ..KnowledgeSettings::default()
        };
        assert!(load_index(&settings).chunks.is_empty());
    }

    #[tokio::test]
    async fn test_selected_retriever_answers_queries() {
        let index = KnowledgeIndex::new(
            1000,
            vec![Chunk {
                source: "s3.tf".into(),
                text: "resource \"aws_s3_bucket\" \"logs\" { tags = {} }".to_string(),
            }],
        );
        let fragments = select_retriever(index).retrieve("s3 bucket tags", 2).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].source, std::path::PathBuf::from("s3.tf"));

        let empty = select_retriever(KnowledgeIndex::new(1000, Vec::new()));
        assert!(empty.retrieve("s3 bucket", 2).await.unwrap().is_empty());
    }

    #[test]
    fn test_build_with_ollama_backend() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.model.provider = Provider::Ollama;
        config.model.base_url = "http://127.0.0.1:11434".to_string();
        config.sandbox.working_dir = dir.path().join("Terraform");
        config.agent.rules_file = dir.path().join("rules.txt");
        config.knowledge.index_path = dir.path().join("index.json");
        config.knowledge.docs_dir = dir.path().join("docs");
        std::fs::write(&config.agent.rules_file, "Tag everything.").unwrap();

        let session = Session::build(config, SessionOptions { auto: true, quiet: true }).unwrap();

        assert!(session.backend_name().starts_with("ollama/"));
        assert!(session.has_rules());
        assert_eq!(session.knowledge_chunks(), 0);
        assert_eq!(session.cooldown(), Duration::from_secs(5));
        assert_eq!(
            session.agent().router().registry().list_names(),
            vec!["Terraform_Knowledge_Base", "Terraform_Apply", "Internet_Search"]
        );
    }
}
