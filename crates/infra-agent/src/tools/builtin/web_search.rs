//! Internet_Search: DuckDuckGo lookups truncated to a character budget

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolResult};

const MAX_RESULTS: usize = 8;

/// External search engine returning plain text
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

/// DuckDuckGo HTML endpoint
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    #[instrument(skip(self), fields(query = %query.chars().take(50).collect::<String>()))]
    async fn search(&self, query: &str) -> Result<String> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));

        debug!("Sending search request to DuckDuckGo");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "Search returned error status");
            bail!("Search failed with status: {}", response.status());
        }

        let html = response.text().await?;
        let hits = parse_duckduckgo_results(&html, MAX_RESULTS)?;
        debug!(hits = hits.len(), "Parsed search results");

        if hits.is_empty() {
            return Ok(format!("No results found for: {}", query));
        }

        Ok(hits
            .iter()
            .map(|h| format!("{}\n{}\n{}", h.title, h.snippet, h.url))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {}", css, e))
}

fn parse_duckduckgo_results(html: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let document = Html::parse_document(html);
    let result_selector = selector(".result")?;
    let title_selector = selector(".result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut hits = Vec::new();
    for result_el in document.select(&result_selector) {
        if hits.len() >= limit {
            break;
        }
        let title_el = result_el.select(&title_selector).next();

        let title = title_el
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        let url = title_el
            .and_then(|el| el.value().attr("href"))
            .map(unwrap_redirect)
            .unwrap_or_default();

        let snippet = result_el
            .select(&snippet_selector)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit { title, url, snippet });
        }
    }

    Ok(hits)
}

/// DuckDuckGo wraps result links as `/l/?uddg=<encoded url>&...`
fn unwrap_redirect(href: &str) -> String {
    href.split("uddg=")
        .nth(1)
        .map(|rest| rest.split('&').next().unwrap_or(rest))
        .and_then(|encoded| urlencoding::decode(encoded).ok())
        .map(|s| s.into_owned())
        .unwrap_or_else(|| href.to_string())
}

/// First `budget` characters of `text` (Unicode scalar values, never splitting one)
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub struct InternetSearchTool {
    backend: Arc<dyn SearchBackend>,
    char_budget: usize,
}

impl InternetSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>, char_budget: usize) -> Self {
        Self { backend, char_budget }
    }
}

#[async_trait]
impl Tool for InternetSearchTool {
    fn name(&self) -> &str {
        "Internet_Search"
    }

    fn description(&self) -> &str {
        "Useful for searching the internet for documentation."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Moderate
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> Result<ToolResult> {
        let query = input.trim();
        if query.is_empty() {
            return Ok(ToolResult::error("Search query is empty"));
        }

        match self.backend.search(query).await {
            Ok(text) => Ok(ToolResult::success(truncate_chars(&text, self.char_budget))),
            Err(e) => {
                warn!(error = %e, "Search failed");
                Ok(ToolResult::error(format!("Search request failed: {}", e)))
            }
        }
    }
}
