//! Configuration management for infra-agent.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for in the current directory and its parents
pub const CONFIG_FILE_NAME: &str = "infra-agent.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub knowledge: KnowledgeSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

/// Model backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI-compatible chat completions endpoint (OpenRouter by default)
    OpenAi,
    /// Local Ollama server
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key (OpenAI-compatible providers only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    /// Retries for retryable backend faults; 0 means faults end the run
    #[serde(default)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_format_errors")]
    pub max_format_errors: usize,
    #[serde(default = "default_rules_file")]
    pub rules_file: PathBuf,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    /// Inline trusted preamble; takes precedence over `preamble_file`
    #[serde(default)]
    pub preamble: Option<String>,
    #[serde(default)]
    pub preamble_file: Option<PathBuf>,
    /// Region used by the built-in preamble
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Block kinds that only the trusted preamble may declare
    #[serde(default = "default_trusted_blocks")]
    pub trusted_blocks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> Provider {
    Provider::OpenAi
}

fn default_model() -> String {
    "kwaipilot/kat-coder-pro:free".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_model_timeout() -> u64 {
    120
}

fn default_max_steps() -> usize {
    15
}

fn default_max_format_errors() -> usize {
    3
}

fn default_rules_file() -> PathBuf {
    PathBuf::from("terraform_examples/agent_rules.txt")
}

fn default_cooldown() -> u64 {
    5
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("Terraform")
}

fn default_binary() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_config_file() -> String {
    "main.tf".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_command_timeout() -> u64 {
    600
}

fn default_trusted_blocks() -> Vec<String> {
    vec!["provider".to_string(), "terraform".to_string()]
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("terraform_examples")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("knowledge_index.json")
}

fn default_top_k() -> usize {
    2
}

fn default_chunk_size() -> usize {
    500
}

fn default_char_budget() -> usize {
    1500
}

fn default_search_timeout() -> u64 {
    30
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            timeout_secs: default_model_timeout(),
            max_retries: 0,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_format_errors: default_max_format_errors(),
            rules_file: default_rules_file(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            binary: default_binary(),
            config_file: default_config_file(),
            preamble: None,
            preamble_file: None,
            region: default_region(),
            command_timeout_secs: default_command_timeout(),
            trusted_blocks: default_trusted_blocks(),
        }
    }
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            index_path: default_index_path(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            char_budget: default_char_budget(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from infra-agent.toml
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_path()?)
    }

    /// Load the discovered configuration, falling back to defaults when no file exists.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match Self::find_config_path() {
            Ok(path) => Self::load_from(path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find infra-agent.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Read the API key for the configured provider from the environment
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Write a commented default configuration file
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# infra-agent configuration

[model]
# "openai" (any OpenAI-compatible endpoint, OpenRouter by default) or "ollama"
provider = "openai"
model = "kwaipilot/kat-coder-pro:free"
base_url = "https://openrouter.ai/api/v1"
api_key_env = "OPENROUTER_API_KEY"
temperature = 0.0
timeout_secs = 120
# Backend faults end the run unless retries are configured
max_retries = 0

[agent]
max_steps = 15
max_format_errors = 3
rules_file = "terraform_examples/agent_rules.txt"
cooldown_secs = 5

[sandbox]
working_dir = "Terraform"
binary = "terraform"
config_file = "main.tf"
region = "us-east-1"
command_timeout_secs = 600
trusted_blocks = ["provider", "terraform"]
# preamble_file = "trusted/provider.tf"

[knowledge]
docs_dir = "terraform_examples"
index_path = "knowledge_index.json"
top_k = 2
chunk_size = 500

[search]
char_budget = 1500
timeout_secs = 30
"#;
