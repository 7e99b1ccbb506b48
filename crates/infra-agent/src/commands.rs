//! CLI commands implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use llm_core::config::CONFIG_FILE_NAME;
use llm_core::{Config, OllamaClient, OpenAiClient, Provider};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{RunOutcome, RunReport};
use crate::knowledge::{KnowledgeIndex, LexicalRetriever};
use crate::progress::{Spinner, StatusLine};
use crate::sandbox::ExecutionSandbox;
use crate::session::{Session, SessionOptions};

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Query used to smoke-test a freshly built knowledge index
const SMOKE_QUERY: &str = "How to create an S3 bucket with tags?";

/// Load configuration from an explicit path or by searching upwards, then apply overrides
pub fn load_config(path: Option<&Path>, model: Option<String>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default()?,
    };
    if let Some(model) = model {
        debug!(model = %model, "Overriding configured model");
        config.model.model = model;
    }
    Ok(config)
}

/// Spawn a Ctrl-C watcher that cancels `token`; abort the handle once the run is over
pub fn cancel_on_ctrl_c(token: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Print how a run ended
pub fn print_report(report: &RunReport) {
    match &report.outcome {
        RunOutcome::FinalAnswer(answer) => {
            println!();
            println!("{}Final Answer:{}", BOLD, RESET);
            println!("{}", answer);
        }
        other => {
            println!();
            println!("{}Error:{} {}", RED, RESET, other);
        }
    }
    println!(
        "{}{} model call(s), {} tool step(s){}",
        DIM,
        report.model_calls,
        report.scratchpad.len(),
        RESET
    );
}

/// One-shot goal; returns whether the run reached a final answer
pub async fn ask(config: Config, opts: SessionOptions, goal: &str) -> Result<bool> {
    if goal.trim().is_empty() {
        anyhow::bail!("No goal given. Usage: infra-agent ask <goal>");
    }

    let session = Session::build(config, opts)?;

    if !opts.quiet {
        println!("{}Infrastructure Agent{}", BOLD, RESET);
        println!("  Model: {}", session.backend_name());
        println!("  Working dir: {}", session.sandbox().working_dir().display());
        println!("  Goal: {}", goal);
        println!("  Auto mode: {}", if opts.auto { "yes" } else { "no" });
        println!();
    }

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);
    let report = session.run_goal(goal, &cancel).await;
    watcher.abort();

    print_report(&report);
    Ok(report.outcome.is_success())
}

/// Tear down everything deployed from the working directory
pub async fn destroy(config: Config) -> Result<()> {
    let sandbox = ExecutionSandbox::from_settings(&config.sandbox)?;
    println!("{}Destroying{} resources in {}", BOLD, RESET, sandbox.working_dir().display());

    let mut spinner = Spinner::new("Destroying resources...");
    spinner.start();
    let narrative = sandbox.destroy().await;
    if !narrative.starts_with("Success") {
        spinner.stop_with_error("terraform destroy failed").await;
        println!("{}", narrative);
        anyhow::bail!("terraform destroy did not complete");
    }
    spinner.stop_with_success("Resources destroyed").await;
    println!("{}", narrative);
    Ok(())
}

/// Build and persist the knowledge index, then run a smoke query against it
pub async fn index(config: Config, docs_dir: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let docs_dir = docs_dir.unwrap_or(config.knowledge.docs_dir);
    let output = output.unwrap_or(config.knowledge.index_path);
    let status = StatusLine::new();

    println!("{}Indexing{} {}", BOLD, RESET, docs_dir.display());

    let (index, stats) = KnowledgeIndex::build(&docs_dir, config.knowledge.chunk_size)
        .with_context(|| format!("Failed to index {}", docs_dir.display()))?;
    if stats.chunks == 0 {
        status.warning(format!("No indexable documents found in {}", docs_dir.display()));
    }

    index.save(&output)?;
    status.success(format!(
        "{} document(s), {} chunk(s) written to {}",
        stats.documents,
        stats.chunks,
        output.display()
    ));
    if stats.skipped > 0 {
        status.warning(format!("{} file(s) skipped (not UTF-8)", stats.skipped));
    }

    let retriever = LexicalRetriever::from_index(index);
    println!();
    println!("{}Test query:{} {}", BLUE, RESET, SMOKE_QUERY);
    match retriever.rank(SMOKE_QUERY, 1).first() {
        Some(fragment) => {
            println!("  Source: {}", fragment.source.display());
            println!("  Content:");
            for line in fragment.text.lines() {
                println!("    {}", line);
            }
        }
        None => println!("  {}No matching fragment{}", DIM, RESET),
    }

    Ok(())
}

/// Check that the model backend and the terraform binary are reachable
pub async fn check(config: Config) -> Result<()> {
    let status = StatusLine::new();
    let timeout = Duration::from_secs(config.model.timeout_secs.min(15));
    let mut healthy = true;

    println!("{}Model backend{}", BOLD, RESET);
    println!("  Provider: {}", config.model.provider);
    println!("  Endpoint: {}", config.model.base_url);
    println!("  Model: {}", config.model.model);

    match config.model.provider {
        Provider::OpenAi => match config.api_key() {
            None => {
                status.check(false, format!("{} is not set", config.model.api_key_env));
                healthy = false;
            }
            Some(key) => {
                let client = OpenAiClient::new(&config.model.base_url, key, &config.model.model, timeout)?;
                match client.list_models().await {
                    Ok(models) => {
                        status.check(true, format!("Endpoint reachable ({} models)", models.len()));
                        if !models.iter().any(|m| m == &config.model.model) {
                            status.warning(format!("Model {} not listed by the endpoint", config.model.model));
                        }
                    }
                    Err(e) => {
                        status.check(false, format!("Endpoint unreachable: {}", e));
                        healthy = false;
                    }
                }
            }
        },
        Provider::Ollama => {
            let client = OllamaClient::with_timeout(&config.model.base_url, timeout)?;
            if client.health_check().await {
                status.check(true, "Ollama is running");
                let models = client.list_models().await.unwrap_or_default();
                match models.iter().find(|m| m.name == config.model.model) {
                    Some(model) => status.check(true, format!("{} available ({})", model.name, model.summary())),
                    None => {
                        status.check(false, format!("{} not pulled", config.model.model));
                        println!("  Pull with: {}ollama pull {}{}", BLUE, config.model.model, RESET);
                        healthy = false;
                    }
                }
            } else {
                status.check(false, "Ollama is not running");
                println!("  Start with: {}ollama serve{}", BLUE, RESET);
                healthy = false;
            }
        }
    }

    println!();
    println!("{}Sandbox{}", BOLD, RESET);
    match which::which(&config.sandbox.binary) {
        Ok(path) => status.check(true, format!("terraform binary: {}", path.display())),
        Err(_) => {
            status.check(false, format!("{} not found in PATH", config.sandbox.binary.display()));
            healthy = false;
        }
    }
    println!("  Working dir: {}", config.sandbox.working_dir.display());

    println!();
    println!("{}Knowledge{}", BOLD, RESET);
    if cfg!(feature = "embeddings") {
        println!("  Ranking: semantic (all-MiniLM-L6-v2), keyword fallback");
    } else {
        println!("  Ranking: keyword (build with --features embeddings for semantic search)");
    }
    match LexicalRetriever::open(&config.knowledge.index_path) {
        Ok(retriever) => status.check(true, format!("{} chunk(s) indexed", retriever.len())),
        Err(_) => status.warning(format!(
            "No index at {}; run `infra-agent index`",
            config.knowledge.index_path.display()
        )),
    }
    status.check(
        config.agent.rules_file.exists(),
        format!("Rules file: {}", config.agent.rules_file.display()),
    );

    if !healthy {
        anyhow::bail!("One or more checks failed");
    }
    Ok(())
}

/// Write a default configuration file
pub async fn config_init(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }
    Config::write_default(&path)?;
    println!("{}Created:{} {}", GREEN, RESET, path.display());
    println!("\nEdit this file to choose a model backend and sandbox settings.");
    Ok(())
}

/// Print the effective configuration as TOML
pub async fn config_show(config: &Config) -> Result<()> {
    match Config::find_config_path() {
        Ok(path) => println!("{}# {}{}", DIM, path.display(), RESET),
        Err(_) => println!("{}# built-in defaults{}", DIM, RESET),
    }
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_applies_model_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[model]\nmodel = \"from-file\"\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.model.model, "from-file");

        let config = load_config(Some(&path), Some("override".to_string())).unwrap();
        assert_eq!(config.model.model, "override");
    }

    #[tokio::test]
    async fn test_config_init_writes_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        config_init(Some(path.clone())).await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(Config::load_from(&path).is_ok());

        std::fs::write(&path, "# edited").unwrap();
        config_init(Some(path.clone())).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn test_index_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(
            docs.join("s3_tags.tf"),
            "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n  tags = { Environment = \"dev\" }\n}",
        )
        .unwrap();
        let output = dir.path().join("index.json");

        index(Config::default(), Some(docs), Some(output.clone())).await.unwrap();

        let retriever = LexicalRetriever::open(&output).unwrap();
        assert_eq!(retriever.len(), 1);
        assert!(retriever.rank(SMOKE_QUERY, 1)[0].source.ends_with("s3_tags.tf"));
    }
}
