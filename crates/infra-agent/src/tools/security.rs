//! Confirmation handling for tools with real-world side effects

use async_trait::async_trait;
use std::io::{self, IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::{SecurityLevel, ToolCall};

/// Lines of tool input shown in the confirmation prompt
const PREVIEW_LINES: usize = 40;

/// Check if stdin is connected to a terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Result of a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// User approved the action
    Approved,
    /// User denied the action
    Denied,
    /// User wants to skip this tool call
    Skip,
    /// User wants to abort the entire run
    Abort,
}

/// Trait for handling tool execution confirmations
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// Request confirmation for a tool call
    async fn confirm(&self, tool_call: &ToolCall, security_level: SecurityLevel) -> ConfirmationResult;
}

/// Asks on the terminal before a dangerous tool runs
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirmation {
    /// Approve everything without asking (`--auto`)
    pub auto_approve: bool,
}

impl TerminalConfirmation {
    pub fn new() -> Self {
        Self { auto_approve: false }
    }

    pub fn auto() -> Self {
        Self { auto_approve: true }
    }
}

#[async_trait]
impl ConfirmationHandler for TerminalConfirmation {
    async fn confirm(&self, tool_call: &ToolCall, security_level: SecurityLevel) -> ConfirmationResult {
        if self.auto_approve || security_level < SecurityLevel::Dangerous {
            return ConfirmationResult::Approved;
        }

        if !is_interactive() {
            warn!(tool = %tool_call.name, "stdin is not a terminal; denying without asking");
            eprintln!(
                "\x1b[93m[Denied]\x1b[0m {} needs confirmation but stdin is not a terminal (pass --auto to allow).",
                tool_call.name
            );
            return ConfirmationResult::Denied;
        }

        print!("{}", render_preview(tool_call, security_level));
        print!("Run it? [Y/n/s(kip)/a(bort)] ");
        let _ = io::stdout().flush();

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut answer).await {
            // EOF: nobody is there to answer
            Ok(0) | Err(_) => {
                debug!("No answer on stdin, aborting run");
                ConfirmationResult::Abort
            }
            Ok(_) => {
                let result = parse_answer(&answer);
                debug!(tool = %tool_call.name, ?result, "Confirmation answer");
                result
            }
        }
    }
}

/// Map a typed answer to a decision; Enter means yes, anything unrecognised means no
fn parse_answer(answer: &str) -> ConfirmationResult {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => ConfirmationResult::Approved,
        "n" | "no" => ConfirmationResult::Denied,
        "s" | "skip" => ConfirmationResult::Skip,
        "a" | "abort" | "q" | "quit" => ConfirmationResult::Abort,
        _ => ConfirmationResult::Denied,
    }
}

/// Header plus the first lines of the input, numbered
fn render_preview(tool_call: &ToolCall, security_level: SecurityLevel) -> String {
    let mut out = format!(
        "\n\x1b[91m[{}]\x1b[0m \x1b[1m{}\x1b[0m wants to run with:\n",
        security_level, tool_call.name
    );
    let total = tool_call.input.lines().count();
    for (n, line) in tool_call.input.lines().take(PREVIEW_LINES).enumerate() {
        out.push_str(&format!("\x1b[2m{:>4}\x1b[0m  {}\n", n + 1, line));
    }
    if total > PREVIEW_LINES {
        out.push_str(&format!("      \x1b[2m({} more lines)\x1b[0m\n", total - PREVIEW_LINES));
    }
    out.push('\n');
    out
}

/// A confirmation handler that always approves (auto mode and tests)
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _tool_call: &ToolCall, _security_level: SecurityLevel) -> ConfirmationResult {
        ConfirmationResult::Approved
    }
}

/// A confirmation handler that always denies
pub struct AutoDeny;

#[async_trait]
impl ConfirmationHandler for AutoDeny {
    async fn confirm(&self, _tool_call: &ToolCall, _security_level: SecurityLevel) -> ConfirmationResult {
        ConfirmationResult::Denied
    }
}
