//! ReAct prompt rendering

use std::path::Path;

use tracing::debug;

use super::state::Scratchpad;
use crate::tools::registry::ToolRegistry;

/// Stop sequence sent with every model call
pub const STOP_SEQUENCE: &str = "\nObservation";

/// Observation injected after a malformed response
pub const FORMAT_ERROR_OBSERVATION: &str = "Format Error: Your response did not follow the required format. \
Reply with EXACTLY ONE of these two shapes:\n\
1) Thought: <reasoning>\nAction: <one tool name>\nAction Input: <the input for the tool>\n\
2) Thought: I now know the final answer\nFinal Answer: <answer>\n\
Never output both shapes in one response. Never output raw Terraform code outside of an Action Input: \
to run code you MUST use Action: Terraform_Apply and put the code entirely in Action Input.";

/// Tool catalogue lines (`name: description`) and the comma-separated name list
pub fn render_catalogue(registry: &ToolRegistry) -> (String, String) {
    let tools = registry.all_tools();
    let catalogue = tools
        .iter()
        .map(|t| format!("{}: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let names = tools
        .iter()
        .map(|t| t.name().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    (catalogue, names)
}

/// Render the full prompt for one model call
pub fn render_prompt(registry: &ToolRegistry, chat_history: &str, goal: &str, scratchpad: &Scratchpad) -> String {
    let (tools, tool_names) = render_catalogue(registry);
    let agent_scratchpad = scratchpad.render();

    format!(
        r#"
Answer the following questions as best you can. You have access to the following tools:

{tools}

**CRITICAL RULES:**
1. Do NOT output raw Terraform code. You must wrap the code inside the `Action Input` of the `Terraform_Apply` tool.
2. Do NOT include `provider "aws"` or a `terraform` block. The tool adds these automatically.
3. You must follow the format below exactly.

Format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Previous conversation history:
{chat_history}

Question: {goal}
Thought:{agent_scratchpad}"#
    )
}

/// Static history built from the rules file; empty when the file is missing
pub fn load_static_history(rules_file: &Path) -> String {
    match std::fs::read_to_string(rules_file) {
        Ok(rules) => {
            debug!(path = %rules_file.display(), len = rules.len(), "Loaded agent rules");
            static_history(rules.trim())
        }
        Err(e) => {
            debug!(path = %rules_file.display(), error = %e, "No agent rules loaded");
            String::new()
        }
    }
}

pub fn static_history(rules: &str) -> String {
    format!("System: CORE INSTRUCTIONS: {}\nAI: Understood.", rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::Step;
    use crate::tools::{SecurityLevel, Tool, ToolContext, ToolResult};
    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NamedTool(&'static str, &'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        fn security_level(&self) -> SecurityLevel {
            SecurityLevel::Safe
        }

        async fn execute(&self, _input: &str, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success(""))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(NamedTool("Terraform_Knowledge_Base", "Finds examples.")).unwrap();
        registry.register(NamedTool("Internet_Search", "Searches the web.")).unwrap();
        registry
    }

    #[test]
    fn test_catalogue() {
        let (catalogue, names) = render_catalogue(&registry());
        assert_eq!(
            catalogue,
            "Terraform_Knowledge_Base: Finds examples.\nInternet_Search: Searches the web."
        );
        assert_eq!(names, "Terraform_Knowledge_Base, Internet_Search");
    }

    #[test]
    fn test_prompt_contains_every_section() {
        let mut scratchpad = Scratchpad::default();
        scratchpad.push(Step::new(
            " look it up\nAction: Internet_Search\nAction Input: s3",
            "results",
        ));

        let prompt = render_prompt(&registry(), "System: CORE INSTRUCTIONS: tag everything\nAI: Understood.", "create a bucket {named} logs", &scratchpad);

        assert!(prompt.contains("Internet_Search: Searches the web."));
        assert!(prompt.contains("should be one of [Terraform_Knowledge_Base, Internet_Search]"));
        assert!(prompt.contains("CORE INSTRUCTIONS: tag everything"));
        assert!(prompt.contains("Question: create a bucket {named} logs\n"));
        assert!(prompt.ends_with(
            "Thought: look it up\nAction: Internet_Search\nAction Input: s3\nObservation: results\nThought: "
        ));
    }

    #[test]
    fn test_empty_scratchpad_ends_with_thought() {
        let prompt = render_prompt(&registry(), "", "goal", &Scratchpad::default());
        assert!(prompt.ends_with("Question: goal\nThought:"));
    }

    #[test]
    fn test_load_static_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent_rules.txt");
        std::fs::write(&path, "Always add an Environment tag.\n").unwrap();

        assert_eq!(
            load_static_history(&path),
            "System: CORE INSTRUCTIONS: Always add an Environment tag.\nAI: Understood."
        );
        assert_eq!(load_static_history(&dir.path().join("missing.txt")), "");
    }

    #[test]
    fn test_format_error_restates_both_shapes() {
        assert!(FORMAT_ERROR_OBSERVATION.contains("Action Input:"));
        assert!(FORMAT_ERROR_OBSERVATION.contains("Final Answer:"));
        assert!(FORMAT_ERROR_OBSERVATION.contains("Terraform_Apply"));
    }
}
