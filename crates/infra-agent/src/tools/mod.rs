//! Tool framework for the ReAct loop
//!
//! Tools take a single text input (the model's `Action Input`) and produce text
//! that is fed back verbatim as the next Observation.

pub mod builtin;
pub mod registry;
pub mod router;
pub mod security;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// How much a tool can affect the outside world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// Read-only lookups
    Safe,
    /// Talks to the network but changes nothing
    Moderate,
    /// Creates or destroys real infrastructure
    Dangerous,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SecurityLevel::Safe => "safe",
            SecurityLevel::Moderate => "moderate",
            SecurityLevel::Dangerous => "dangerous",
        };
        f.write_str(label)
    }
}

/// What a tool hands back; both variants become an Observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    /// Text passed to the model verbatim
    Output(String),
    /// The tool ran but could not serve the request
    Failed(String),
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        ToolResult::Output(output.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Failed(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Output(_))
    }

    /// Raw text of either variant
    pub fn text(&self) -> &str {
        match self {
            ToolResult::Output(text) | ToolResult::Failed(text) => text,
        }
    }

    /// Text handed back to the model as the Observation
    pub fn observation(&self) -> String {
        match self {
            ToolResult::Output(text) => text.clone(),
            ToolResult::Failed(message) => format!("Error: {}", message),
        }
    }
}

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Whether running in auto mode (skip confirmations)
    pub auto_mode: bool,
    /// Upper bound on a single tool invocation
    pub tool_timeout: Duration,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            auto_mode: false,
            tool_timeout: Duration::from_secs(1800),
        }
    }
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set auto mode
    pub fn with_auto_mode(mut self, auto: bool) -> Self {
        self.auto_mode = auto;
        self
    }

    /// Set the per-invocation timeout
    pub fn with_tool_timeout(mut self, limit: Duration) -> Self {
        self.tool_timeout = limit;
        self
    }
}

/// A tool call parsed from the model's response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Tool name, matched exactly
    pub name: String,
    /// Raw `Action Input` text
    pub input: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
        }
    }
}

/// A named capability the agent can invoke with one line of text
#[async_trait]
pub trait Tool: Send + Sync {
    /// Exact name the model uses after `Action:`
    fn name(&self) -> &str;

    /// One-line description rendered into the prompt's tool catalogue
    fn description(&self) -> &str;

    fn security_level(&self) -> SecurityLevel;

    /// Run with the raw `Action Input`; `Err` is reported to the model as a tool fault
    async fn execute(&self, input: &str, ctx: &ToolContext) -> Result<ToolResult>;
}
