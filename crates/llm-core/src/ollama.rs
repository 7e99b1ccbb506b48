//! Ollama API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::backend::CompletionBackend;
use crate::error::LlmError;

/// A locally pulled model, as listed by `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct LocalModel {
    pub name: String,
    /// Bytes on disk
    pub size: u64,
    #[serde(default)]
    details: LocalModelDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LocalModelDetails {
    parameter_size: Option<String>,
    quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<LocalModel>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

/// Client for a local Ollama server (`/api/generate`)
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a new client with default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_timeout(base_url, Duration::from_secs(120))
    }

    /// Create a new client whose requests are bounded by `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            model: "llama3.2".to_string(),
            temperature: 0.0,
            timeout,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Check if Ollama is running
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Models pulled on the server
    pub async fn list_models(&self) -> Result<Vec<LocalModel>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body, None));
        }

        let tags: TagsResponse = resp.json().await?;
        Ok(tags.models)
    }

    /// Run a non-streaming generate request
    #[instrument(skip(self, prompt, stop), fields(model = %self.model, prompt_len = prompt.len()))]
    pub async fn generate(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);

        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                stop,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Network(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body, None));
        }

        let body: GenerateResponse = resp.json().await?;
        debug!(
            prompt_tokens = body.prompt_eval_count,
            completion_tokens = body.eval_count,
            "Ollama generate completed"
        );
        Ok(body.response)
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError> {
        self.generate(prompt, stop).await
    }

    fn describe(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

impl LocalModel {
    /// e.g. "1.9 GB, 3.2B Q4_K_M"
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{:.1} GB", self.size as f64 / 1_073_741_824.0)];
        let details = [&self.details.parameter_size, &self.details.quantization_level];
        let tags: Vec<&str> = details.iter().filter_map(|d| d.as_deref()).collect();
        if !tags.is_empty() {
            parts.push(tags.join(" "));
        }
        parts.join(", ")
    }
}
