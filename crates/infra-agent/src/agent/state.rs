//! Agent run state, configuration and outcomes

use std::fmt;
use std::time::Duration;

use llm_core::AgentSettings;

use super::parser::MalformedReason;

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on model calls per run
    pub max_steps: usize,
    /// Consecutive malformed responses that end the run
    pub max_format_errors: usize,
    /// Timeout for a single model call
    pub model_timeout: Duration,
    /// Timeout for a single tool invocation
    pub tool_timeout: Duration,
    /// Static prior context rendered into every prompt
    pub chat_history: String,
    /// Auto mode (skip confirmations)
    pub auto_mode: bool,
    /// Whether to print steps as they happen
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_format_errors: 3,
            model_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(1800),
            chat_history: String::new(),
            auto_mode: false,
            verbose: true,
        }
    }
}

impl AgentConfig {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            max_format_errors: settings.max_format_errors,
            ..Default::default()
        }
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_model_timeout(mut self, limit: Duration) -> Self {
        self.model_timeout = limit;
        self
    }

    pub fn with_tool_timeout(mut self, limit: Duration) -> Self {
        self.tool_timeout = limit;
        self
    }

    pub fn with_chat_history(mut self, history: impl Into<String>) -> Self {
        self.chat_history = history.into();
        self
    }

    pub fn with_auto_mode(mut self, auto: bool) -> Self {
        self.auto_mode = auto;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// One completed reasoning step: the raw model output and what came back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Model output for this step, as generated
    pub log: String,
    pub observation: String,
}

impl Step {
    pub fn new(log: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            observation: observation.into(),
        }
    }
}

/// Append-only transcript of a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratchpad {
    steps: Vec<Step>,
}

impl Scratchpad {
    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Text appended after the prompt's trailing `Thought:`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(&step.log);
            out.push_str("\nObservation: ");
            out.push_str(&step.observation);
            out.push_str("\nThought: ");
        }
        out
    }
}

/// How a run ended; every run ends in exactly one of these
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    FinalAnswer(String),
    FormatErrorLimit { errors: usize, last: MalformedReason },
    MaxStepsExceeded(usize),
    ModelFault(String),
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::FinalAnswer(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::FinalAnswer(text) => write!(f, "{}", text),
            RunOutcome::FormatErrorLimit { errors, last } => write!(
                f,
                "Agent stopped after {} consecutive malformed responses (last: {})",
                errors, last
            ),
            RunOutcome::MaxStepsExceeded(steps) => {
                write!(f, "Agent stopped after {} model calls without a final answer", steps)
            }
            RunOutcome::ModelFault(e) => write!(f, "Model backend failed: {}", e),
            RunOutcome::Cancelled => write!(f, "Run cancelled"),
        }
    }
}

/// Consecutive malformed-response counter; any well-formed response resets it
#[derive(Debug, Clone)]
pub struct FormatErrorCounter {
    consecutive: usize,
    max: usize,
}

impl FormatErrorCounter {
    pub fn new(max: usize) -> Self {
        Self {
            consecutive: 0,
            max: max.max(1),
        }
    }

    /// Record a malformed response; true once the limit is reached
    pub fn record_error(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.max
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn count(&self) -> usize {
        self.consecutive
    }
}

/// State of the agent during one run
#[derive(Debug)]
pub struct AgentState {
    pub scratchpad: Scratchpad,
    /// Model calls made so far
    pub model_calls: usize,
    pub format_errors: FormatErrorCounter,
    /// Set once the run has ended
    pub outcome: Option<RunOutcome>,
}

impl AgentState {
    pub fn new(max_format_errors: usize) -> Self {
        Self {
            scratchpad: Scratchpad::default(),
            model_calls: 0,
            format_errors: FormatErrorCounter::new(max_format_errors),
            outcome: None,
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            outcome: self.outcome.unwrap_or(RunOutcome::Cancelled),
            scratchpad: self.scratchpad,
            model_calls: self.model_calls,
        }
    }
}

/// What a finished run hands back to the caller
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub scratchpad: Scratchpad,
    pub model_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_counter_resets() {
        let mut counter = FormatErrorCounter::new(3);
        assert!(!counter.record_error());
        assert!(!counter.record_error());
        counter.reset();
        assert_eq!(counter.count(), 0);
        assert!(!counter.record_error());
        assert!(!counter.record_error());
        assert!(counter.record_error());
    }

    #[test]
    fn test_format_counter_zero_max_means_one() {
        let mut counter = FormatErrorCounter::new(0);
        assert!(counter.record_error());
    }

    #[test]
    fn test_scratchpad_render() {
        let mut pad = Scratchpad::default();
        assert_eq!(pad.render(), "");
        pad.push(Step::new(" a\nAction: X\nAction Input: 1", "one"));
        pad.push(Step::new(" b\nAction: X\nAction Input: 2", "two"));
        assert_eq!(
            pad.render(),
            " a\nAction: X\nAction Input: 1\nObservation: one\nThought:  b\nAction: X\nAction Input: 2\nObservation: two\nThought: "
        );
    }

    #[test]
    fn test_first_outcome_wins() {
        let mut state = AgentState::new(3);
        state.finish(RunOutcome::Cancelled);
        state.finish(RunOutcome::FinalAnswer("late".to_string()));
        assert_eq!(state.into_report().outcome, RunOutcome::Cancelled);
    }

    #[test]
    fn test_outcome_messages() {
        assert!(RunOutcome::FinalAnswer("ok".into()).is_success());
        let msg = RunOutcome::FormatErrorLimit {
            errors: 3,
            last: MalformedReason::NoDecision,
        }
        .to_string();
        assert!(msg.contains("3 consecutive malformed responses"));
        assert!(RunOutcome::MaxStepsExceeded(15).to_string().contains("15 model calls"));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = AgentSettings {
            max_steps: 7,
            max_format_errors: 2,
            ..AgentSettings::default()
        };
        let config = AgentConfig::from_settings(&settings).with_auto_mode(true);
        assert_eq!(config.max_steps, 7);
        assert_eq!(config.max_format_errors, 2);
        assert!(config.auto_mode);
    }
}
