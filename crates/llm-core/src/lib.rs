//! llm-core: model backend plumbing for infra-agent
//!
//! Provides:
//! - Configuration loading (infra-agent.toml)
//! - The `CompletionBackend` abstraction with an optional retry layer
//! - OpenAI-compatible (OpenRouter) and Ollama clients

pub mod backend;
pub mod config;
pub mod error;
pub mod ollama;
pub mod openai;

pub use backend::{create_backend, CompletionBackend, RetryConfig, RetryingBackend};
pub use config::{AgentSettings, Config, KnowledgeSettings, ModelConfig, Provider, SandboxSettings, SearchSettings};
pub use error::LlmError;
pub use ollama::{LocalModel, OllamaClient};
pub use openai::OpenAiClient;
