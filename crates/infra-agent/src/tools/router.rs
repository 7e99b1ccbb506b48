//! Dispatch of parsed tool calls: lookup, confirmation gate, time budget

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::registry::ToolRegistry;
use super::security::{ConfirmationHandler, ConfirmationResult};
use super::{SecurityLevel, ToolCall, ToolContext, ToolResult};

/// How a routed call ended
#[derive(Debug)]
pub enum RouteResult {
    /// The tool ran; its result may still describe a failure
    Ran(ToolResult),
    Skipped,
    Denied,
    Aborted,
    UnknownTool(String),
    /// The tool itself returned an error
    Faulted(String),
    TimedOut(Duration),
}

impl RouteResult {
    /// Whether the run should stop after this call
    pub fn is_abort(&self) -> bool {
        matches!(self, RouteResult::Aborted)
    }

    /// Observation text fed back to the model
    pub fn observation(&self, tool: &str) -> String {
        match self {
            RouteResult::Ran(result) => result.observation(),
            RouteResult::Skipped => format!(
                "The user skipped running {}. Choose a different action or give a Final Answer.",
                tool
            ),
            RouteResult::Denied => format!(
                "The user denied permission to run {}. Do not retry the same action; explain what you would have done in a Final Answer.",
                tool
            ),
            RouteResult::Aborted => "The user aborted the run.".to_string(),
            RouteResult::UnknownTool(name) => format!("Error: unknown tool '{}'", name),
            RouteResult::Faulted(e) => format!("Error: {} failed: {}", tool, e),
            RouteResult::TimedOut(limit) => {
                format!("Error: {} timed out after {} seconds", tool, limit.as_secs())
            }
        }
    }
}

pub struct ToolRouter {
    registry: ToolRegistry,
    confirmation: Arc<dyn ConfirmationHandler>,
}

impl ToolRouter {
    pub fn new(registry: ToolRegistry, confirmation: impl ConfirmationHandler + 'static) -> Self {
        Self {
            registry,
            confirmation: Arc::new(confirmation),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[instrument(skip(self, call, ctx), fields(tool = %call.name, input_len = call.input.len()))]
    pub async fn route(&self, call: &ToolCall, ctx: &ToolContext) -> RouteResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!("Unknown tool requested");
            return RouteResult::UnknownTool(call.name.clone());
        };

        let level = tool.security_level();
        if let Some(refused) = self.gate(call, level, ctx).await {
            return refused;
        }

        debug!(security_level = %level, "Executing tool");
        match tokio::time::timeout(ctx.tool_timeout, tool.execute(&call.input, ctx)).await {
            Ok(Ok(result)) => {
                match &result {
                    ToolResult::Output(text) => info!(output_len = text.len(), "Tool finished"),
                    ToolResult::Failed(message) => warn!(error = %message, "Tool reported failure"),
                }
                RouteResult::Ran(result)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Tool returned an error");
                RouteResult::Faulted(format!("{:#}", e))
            }
            Err(_) => {
                warn!(timeout_secs = ctx.tool_timeout.as_secs(), "Tool timed out");
                RouteResult::TimedOut(ctx.tool_timeout)
            }
        }
    }

    /// Ask before side effects; `None` means the call may proceed
    async fn gate(&self, call: &ToolCall, level: SecurityLevel, ctx: &ToolContext) -> Option<RouteResult> {
        if level < SecurityLevel::Dangerous || ctx.auto_mode {
            return None;
        }

        let decision = self.confirmation.confirm(call, level).await;
        info!(decision = ?decision, "Confirmation answered");
        match decision {
            ConfirmationResult::Approved => None,
            ConfirmationResult::Denied => Some(RouteResult::Denied),
            ConfirmationResult::Skip => Some(RouteResult::Skipped),
            ConfirmationResult::Abort => Some(RouteResult::Aborted),
        }
    }
}

impl fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRouter")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::security::{AutoApprove, AutoDeny};
    use crate::tools::Tool;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    enum Behavior {
        Echo,
        Fail,
        Hang,
    }

    struct StubTool {
        name: &'static str,
        level: SecurityLevel,
        behavior: Behavior,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn security_level(&self) -> SecurityLevel {
            self.level
        }

        async fn execute(&self, input: &str, _ctx: &ToolContext) -> Result<ToolResult> {
            match self.behavior {
                Behavior::Echo => Ok(ToolResult::success(input)),
                Behavior::Fail => bail!("index file is corrupt"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ToolResult::success("late"))
                }
            }
        }
    }

    fn router(confirmation: impl ConfirmationHandler + 'static) -> ToolRouter {
        let stubs = [
            ("echo", SecurityLevel::Safe, Behavior::Echo),
            ("launch", SecurityLevel::Dangerous, Behavior::Echo),
            ("broken", SecurityLevel::Safe, Behavior::Fail),
            ("slow", SecurityLevel::Safe, Behavior::Hang),
        ];
        let mut registry = ToolRegistry::new();
        for (name, level, behavior) in stubs {
            registry.register(StubTool { name, level, behavior }).unwrap();
        }
        ToolRouter::new(registry, confirmation)
    }

    #[tokio::test]
    async fn test_route_runs_tool() {
        let result = router(AutoApprove)
            .route(&ToolCall::new("echo", "hello"), &ToolContext::default())
            .await;
        assert_eq!(result.observation("echo"), "hello");
    }

    #[tokio::test]
    async fn test_route_unknown_tool() {
        let result = router(AutoApprove)
            .route(&ToolCall::new("nonexistent", ""), &ToolContext::default())
            .await;
        assert!(matches!(result, RouteResult::UnknownTool(ref n) if n == "nonexistent"));
        assert_eq!(result.observation("nonexistent"), "Error: unknown tool 'nonexistent'");
    }

    #[tokio::test]
    async fn test_dangerous_tool_needs_confirmation() {
        let router = router(AutoDeny);

        let denied = router.route(&ToolCall::new("launch", "x"), &ToolContext::default()).await;
        assert!(matches!(denied, RouteResult::Denied));
        assert!(denied.observation("launch").contains("denied permission"));

        // safe tools never ask
        let safe = router.route(&ToolCall::new("echo", "hi"), &ToolContext::default()).await;
        assert!(matches!(safe, RouteResult::Ran(_)));
    }

    #[tokio::test]
    async fn test_auto_mode_bypasses_confirmation() {
        let ctx = ToolContext::default().with_auto_mode(true);
        let result = router(AutoDeny).route(&ToolCall::new("launch", "x"), &ctx).await;
        assert_eq!(result.observation("launch"), "x");
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let result = router(AutoApprove)
            .route(&ToolCall::new("broken", "q"), &ToolContext::default())
            .await;
        assert_eq!(result.observation("broken"), "Error: broken failed: index file is corrupt");
    }

    #[tokio::test]
    async fn test_tool_timeout() {
        let ctx = ToolContext::default().with_tool_timeout(Duration::from_millis(50));
        let result = router(AutoApprove).route(&ToolCall::new("slow", ""), &ctx).await;

        assert!(matches!(result, RouteResult::TimedOut(_)));
        assert_eq!(result.observation("slow"), "Error: slow timed out after 0 seconds");
    }
}
