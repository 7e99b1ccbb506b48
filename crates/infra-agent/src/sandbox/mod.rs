//! Execution sandbox for model-written Terraform
//!
//! Owns one working directory (one deployment target). Model-supplied code is
//! sanitized, prefixed with the trusted preamble, written as the complete
//! configuration and applied with a two-phase `init` + `apply`. Every failure
//! comes back as narrative text; nothing here returns an error to the caller.
//!
//! `apply` and `destroy` hold an async mutex for their whole duration, so sharing
//! one sandbox between sessions serializes all mutations of its directory.

mod command;
mod sanitize;

pub use command::{run_command, CommandOutcome, CommandResult};
pub use sanitize::{Sanitized, Sanitizer};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use llm_core::SandboxSettings;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{info, instrument, warn};

/// Provider configuration used when none is configured explicitly
const DEFAULT_PREAMBLE_TEMPLATE: &str = r#"terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

provider "aws" {
  region = "{region}"
}
"#;

/// Build the default trusted preamble for a region
pub fn default_preamble(region: &str) -> String {
    DEFAULT_PREAMBLE_TEMPLATE.replace("{region}", region)
}

/// Sandbox around the provisioning CLI
#[derive(Debug)]
pub struct ExecutionSandbox {
    working_dir: PathBuf,
    binary: PathBuf,
    config_file: String,
    preamble: String,
    sanitizer: Sanitizer,
    command_timeout: Duration,
    gate: Mutex<()>,
}

impl ExecutionSandbox {
    /// Create a sandbox for `working_dir` with the given trusted preamble
    pub fn new(working_dir: impl Into<PathBuf>, preamble: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            binary: PathBuf::from("terraform"),
            config_file: "main.tf".to_string(),
            preamble: preamble.into(),
            sanitizer: Sanitizer::default(),
            command_timeout: Duration::from_secs(600),
            gate: Mutex::new(()),
        }
    }

    /// Create a sandbox from the `[sandbox]` configuration section
    pub fn from_settings(settings: &SandboxSettings) -> Result<Self> {
        let preamble = match (&settings.preamble, &settings.preamble_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read trusted preamble {}", path.display()))?,
            (None, None) => default_preamble(&settings.region),
        };

        Ok(Self::new(settings.working_dir.clone(), preamble)
            .with_binary(settings.binary.clone())
            .with_config_file(settings.config_file.clone())
            .with_command_timeout(Duration::from_secs(settings.command_timeout_secs))
            .with_sanitizer(Sanitizer::new(settings.trusted_blocks.iter().cloned())))
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_config_file(mut self, name: impl Into<String>) -> Self {
        self.config_file = name.into();
        self
    }

    pub fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = limit;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Path of the configuration file rewritten on every apply
    pub fn config_path(&self) -> PathBuf {
        self.working_dir.join(&self.config_file)
    }

    /// Compose the full configuration for a model-supplied body
    pub fn compose(&self, code: &str) -> (String, Sanitized) {
        let sanitized = self.sanitizer.sanitize(strip_code_fence(code));
        let mut config = String::with_capacity(self.preamble.len() + sanitized.body.len() + 2);
        config.push_str(self.preamble.trim_end());
        config.push_str("\n\n");
        config.push_str(sanitized.body.trim());
        config.push('\n');
        (config, sanitized)
    }

    /// Sanitize, write and apply `code`; returns a narrative of what happened
    #[instrument(skip(self, code), fields(working_dir = %self.working_dir.display(), code_len = code.len()))]
    pub async fn apply(&self, code: &str) -> String {
        let _guard = self.gate.lock().await;

        let (config, sanitized) = self.compose(code);
        if let Err(e) = self.write_config(&config).await {
            warn!(error = %e, "Failed to write configuration");
            return format!(
                "Error: failed to write configuration to {}: {}",
                self.config_path().display(),
                e
            );
        }
        info!(removed_blocks = sanitized.removed.len(), "Configuration written");

        let init = self.run(&["init", "-input=false", "-no-color"]).await;
        if !init.succeeded() {
            warn!("Init failed, skipping apply");
            return describe_outcome(&self.step_label("init"), &init);
        }

        let apply = self
            .run(&["apply", "-auto-approve", "-input=false", "-no-color"])
            .await;
        info!(succeeded = apply.succeeded(), "Apply finished");

        let mut narrative = describe_outcome(&self.step_label("apply"), &apply);
        if sanitized.was_modified() {
            narrative.push_str(&format!(
                "\nNote: removed block(s) managed by the sandbox: {}",
                sanitized.removed.join(", ")
            ));
        }
        narrative
    }

    /// Tear down everything tracked in the working directory
    #[instrument(skip(self), fields(working_dir = %self.working_dir.display()))]
    pub async fn destroy(&self) -> String {
        let _guard = self.gate.lock().await;

        if let Err(e) = tokio::fs::create_dir_all(&self.working_dir).await {
            return format!(
                "Error: working directory {} is unavailable: {}",
                self.working_dir.display(),
                e
            );
        }

        let outcome = self
            .run(&["destroy", "-auto-approve", "-input=false", "-no-color"])
            .await;
        info!(succeeded = outcome.succeeded(), "Destroy finished");
        describe_outcome(&self.step_label("destroy"), &outcome)
    }

    async fn run(&self, args: &[&str]) -> CommandOutcome {
        run_command(&self.binary, args, &self.working_dir, self.command_timeout).await
    }

    /// Replace the configuration file in one step (temp file + rename)
    async fn write_config(&self, contents: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.working_dir).await?;
        let target = self.config_path();
        let staging = self.working_dir.join(format!(".{}.tmp", self.config_file));
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, &target).await
    }

    fn step_label(&self, step: &str) -> String {
        let program = self
            .binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.binary.display().to_string());
        format!("{} {}", program, step)
    }
}

/// Turn a command outcome into text the model can act on
fn describe_outcome(step: &str, outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Completed(r) if r.succeeded => format!("Success:\n{}", r.stdout),
        CommandOutcome::Completed(r) => {
            let code = r
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let mut text = format!("Error during {} (exit code {}):\n{}", step, code, r.stderr);
            if !r.stdout.trim().is_empty() {
                text.push_str("\n--- stdout ---\n");
                text.push_str(&r.stdout);
            }
            text
        }
        CommandOutcome::LaunchFailed(e) => format!("Error: failed to run {}: {}", step, e),
        CommandOutcome::TimedOut(limit) => {
            format!("Error: {} timed out after {} seconds", step, limit.as_secs())
        }
    }
}

/// Unwrap a markdown code fence (```hcl ... ```) if the whole input is one
pub fn strip_code_fence(code: &str) -> &str {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return code;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return code;
    };
    // Drop the info string (hcl, terraform, ...) on the opening line
    match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    }
}
