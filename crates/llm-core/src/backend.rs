//! Completion backend abstraction
//!
//! The agent only needs "prompt in, text out". Each provider client implements
//! [`CompletionBackend`]; [`RetryingBackend`] layers an optional retry policy on top.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{ModelConfig, Provider};
use crate::error::LlmError;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

/// A text completion service
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Complete `prompt`, stopping generation at any of `stop`
    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError>;

    /// Short human-readable identifier (provider/model)
    fn describe(&self) -> String;
}

/// Retry policy for retryable backend faults
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub initial_backoff: Duration,
    /// Upper bound on a single delay
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let Some(after) = err.retry_after() {
            return after.min(self.max_backoff);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Wraps a backend and retries retryable faults according to a [`RetryConfig`]
pub struct RetryingBackend {
    inner: Arc<dyn CompletionBackend>,
    retry: RetryConfig,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn CompletionBackend>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl CompletionBackend for RetryingBackend {
    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(prompt, stop).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff_for(attempt, &e);
                    warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying model request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(error = %e, attempts = attempt + 1, "Model request failed");
                    return Err(e);
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// Create a backend for the configured provider
pub fn create_backend(config: &ModelConfig, api_key: Option<String>) -> Result<Arc<dyn CompletionBackend>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_backend: called");
    let timeout = Duration::from_secs(config.timeout_secs);

    let backend: Arc<dyn CompletionBackend> = match config.provider {
        Provider::OpenAi => {
            let key = api_key.ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;
            Arc::new(
                OpenAiClient::new(&config.base_url, key, &config.model, timeout)?
                    .with_temperature(config.temperature),
            )
        }
        Provider::Ollama => Arc::new(
            OllamaClient::with_timeout(&config.base_url, timeout)?
                .with_model(&config.model)
                .with_temperature(config.temperature),
        ),
    };

    if config.max_retries == 0 {
        return Ok(backend);
    }

    Ok(Arc::new(RetryingBackend::new(
        backend,
        RetryConfig::default().with_max_retries(config.max_retries),
    )))
}
