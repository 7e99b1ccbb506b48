//! Agent loop implementation
//!
//! One run alternates strictly between a model call and at most one tool call:
//! AWAIT_MODEL -> PARSE_RESPONSE -> (DISPATCH_TOOL | FORMAT_ERROR) -> AWAIT_MODEL,
//! until a valid Final Answer or a terminal outcome.

use std::io::{stdout, Write};
use std::sync::Arc;

use llm_core::CompletionBackend;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::progress::Spinner;
use crate::tools::router::{RouteResult, ToolRouter};
use crate::tools::{ToolCall, ToolContext};

use super::parser::{parse_response, ParsedStep};
use super::prompt::{render_prompt, FORMAT_ERROR_OBSERVATION, STOP_SEQUENCE};
use super::state::{AgentConfig, AgentState, RunOutcome, RunReport, Step};

// ANSI colors
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Observation characters echoed to the terminal in verbose mode
const OBSERVATION_PREVIEW: usize = 600;

/// The agent loop orchestrator
pub struct AgentLoop {
    backend: Arc<dyn CompletionBackend>,
    router: Arc<ToolRouter>,
    config: AgentConfig,
}

impl AgentLoop {
    /// Create a new agent loop
    pub fn new(backend: Arc<dyn CompletionBackend>, router: Arc<ToolRouter>, config: AgentConfig) -> Self {
        Self {
            backend,
            router,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Run the agent for one goal
    #[instrument(skip(self, goal, cancel), fields(backend = %self.backend.describe(), goal_len = goal.len()))]
    pub async fn run(&self, goal: &str, cancel: &CancellationToken) -> RunReport {
        info!(
            max_steps = self.config.max_steps,
            max_format_errors = self.config.max_format_errors,
            "Starting agent run"
        );

        let mut state = AgentState::new(self.config.max_format_errors);
        let registry = self.router.registry();
        let tool_names = registry.list_names();
        let stop = vec![STOP_SEQUENCE.to_string()];
        let tool_ctx = ToolContext::new()
            .with_auto_mode(self.config.auto_mode)
            .with_tool_timeout(self.config.tool_timeout);

        while !state.is_finished() {
            if cancel.is_cancelled() {
                info!(model_calls = state.model_calls, "Run cancelled");
                state.finish(RunOutcome::Cancelled);
                break;
            }
            if state.model_calls >= self.config.max_steps {
                warn!(model_calls = state.model_calls, "Step limit reached");
                state.finish(RunOutcome::MaxStepsExceeded(state.model_calls));
                break;
            }

            let prompt = render_prompt(registry, &self.config.chat_history, goal, &state.scratchpad);
            state.model_calls += 1;
            debug!(step = state.model_calls, prompt_len = prompt.len(), "Calling model");

            if self.config.verbose {
                println!("{}[Step {}]{}", DIM, state.model_calls, RESET);
            }

            let response = match self.call_model(&prompt, &stop, cancel).await {
                Ok(text) => text,
                Err(outcome) => {
                    state.finish(outcome);
                    break;
                }
            };

            if self.config.verbose {
                println!("{}Thought:{}{}", BLUE, RESET, response.trim_end());
            }

            match parse_response(&response, &tool_names) {
                ParsedStep::FinalAnswer { text } => {
                    info!(model_calls = state.model_calls, "Agent reached a final answer");
                    if self.config.verbose {
                        println!("{}Done{}", GREEN, RESET);
                    }
                    state.finish(RunOutcome::FinalAnswer(text));
                }
                ParsedStep::Malformed { reason } => {
                    let limit_reached = state.format_errors.record_error();
                    warn!(
                        %reason,
                        consecutive = state.format_errors.count(),
                        "Malformed model response"
                    );
                    if self.config.verbose {
                        println!("{}[Format error: {}]{}", YELLOW, reason, RESET);
                    }

                    state
                        .scratchpad
                        .push(Step::new(response, FORMAT_ERROR_OBSERVATION));

                    if limit_reached {
                        state.finish(RunOutcome::FormatErrorLimit {
                            errors: state.format_errors.count(),
                            last: reason,
                        });
                    }
                }
                ParsedStep::Action { name, input } => {
                    state.format_errors.reset();
                    let call = ToolCall::new(name, input);

                    let result = self.dispatch(&call, &tool_ctx).await;
                    let observation = result.observation(&call.name);

                    if self.config.verbose {
                        let preview: String = observation.chars().take(OBSERVATION_PREVIEW).collect();
                        let more = if preview.len() < observation.len() { " ..." } else { "" };
                        println!("{}Observation:{} {}{}{}{}", CYAN, RESET, DIM, preview, more, RESET);
                    }

                    state.scratchpad.push(Step::new(response, observation));

                    if result.is_abort() {
                        state.finish(RunOutcome::Cancelled);
                    }
                }
            }
        }

        let report = state.into_report();
        info!(
            success = report.outcome.is_success(),
            model_calls = report.model_calls,
            steps = report.scratchpad.len(),
            "Agent run finished"
        );
        report
    }

    /// One bounded model call; cancellation is honoured while waiting
    async fn call_model(
        &self,
        prompt: &str,
        stop: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, RunOutcome> {
        let mut spinner = if self.config.verbose {
            let mut s = Spinner::new("Thinking...");
            s.start();
            Some(s)
        } else {
            None
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(RunOutcome::Cancelled),
            reply = tokio::time::timeout(self.config.model_timeout, self.backend.complete(prompt, stop)) => {
                match reply {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => {
                        warn!(error = %e, "Model call failed");
                        Err(RunOutcome::ModelFault(e.to_string()))
                    }
                    Err(_) => {
                        warn!(timeout_secs = self.config.model_timeout.as_secs(), "Model call timed out");
                        Err(RunOutcome::ModelFault(format!(
                            "model call timed out after {} seconds",
                            self.config.model_timeout.as_secs()
                        )))
                    }
                }
            }
        };

        if let Some(ref mut s) = spinner {
            s.stop().await;
        }
        result
    }

    async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> RouteResult {
        let mut spinner = if self.config.verbose {
            println!("{}[Tool: {}]{}", CYAN, call.name, RESET);
            let _ = stdout().flush();
            let mut s = Spinner::new(format!("Running {}...", call.name));
            s.start();
            Some(s)
        } else {
            None
        };

        let result = self.router.route(call, ctx).await;

        if let Some(ref mut s) = spinner {
            s.stop().await;
        }
        result
    }
}
