//! Strict parser for ReAct-formatted model output
//!
//! A response must contain exactly one of:
//! - an `Action:` line followed by an `Action Input:` section, or
//! - a `Final Answer:` section.
//!
//! Anything else is [`ParsedStep::Malformed`].

use std::fmt;

const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const FINAL_ANSWER: &str = "Final Answer:";
const OBSERVATION: &str = "Observation:";

/// The decision extracted from one model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedStep {
    Action { name: String, input: String },
    FinalAnswer { text: String },
    Malformed { reason: MalformedReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// Neither an action nor a final answer
    NoDecision,
    /// Both an action and a final answer
    Ambiguous,
    /// `Action Input:` without an `Action:` line
    MissingAction,
    /// `Action:` without an `Action Input:` section after it
    MissingActionInput,
    /// More than one `Action:` or `Action Input:`
    MultipleActions,
    /// `Action:` names a tool that is not registered
    UnknownTool(String),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::NoDecision => write!(f, "response contained neither an Action nor a Final Answer"),
            MalformedReason::Ambiguous => write!(f, "response contained both an Action and a Final Answer"),
            MalformedReason::MissingAction => write!(f, "Action Input given without an Action"),
            MalformedReason::MissingActionInput => write!(f, "Action given without an Action Input"),
            MalformedReason::MultipleActions => write!(f, "more than one Action in a single response"),
            MalformedReason::UnknownTool(name) => write!(f, "unknown tool '{}'", name),
        }
    }
}

/// Byte offsets of the marker lines found in a response
#[derive(Debug, Default)]
struct Markers {
    actions: Vec<usize>,
    inputs: Vec<usize>,
    final_answer: Option<usize>,
}

/// Parse a model response against the set of registered tool names
pub fn parse_response(response: &str, tool_names: &[&str]) -> ParsedStep {
    let text = strip_hallucinated_observation(response);
    let markers = find_markers(text);

    let has_action = !markers.actions.is_empty() || !markers.inputs.is_empty();

    match (has_action, markers.final_answer) {
        (true, Some(_)) => malformed(MalformedReason::Ambiguous),
        (false, None) => malformed(MalformedReason::NoDecision),
        (false, Some(at)) => ParsedStep::FinalAnswer {
            text: text[at + FINAL_ANSWER.len()..].trim().to_string(),
        },
        (true, None) => parse_action(text, &markers, tool_names),
    }
}

fn parse_action(text: &str, markers: &Markers, tool_names: &[&str]) -> ParsedStep {
    if markers.actions.len() > 1 || markers.inputs.len() > 1 {
        return malformed(MalformedReason::MultipleActions);
    }
    let Some(&action_at) = markers.actions.first() else {
        return malformed(MalformedReason::MissingAction);
    };
    let Some(&input_at) = markers.inputs.first().filter(|&&at| at > action_at) else {
        return malformed(MalformedReason::MissingActionInput);
    };

    let name_line = &text[action_at + ACTION.len()..];
    let name = name_line.lines().next().unwrap_or_default().trim();
    if name.is_empty() {
        return malformed(MalformedReason::MissingAction);
    }
    if !tool_names.contains(&name) {
        return malformed(MalformedReason::UnknownTool(name.to_string()));
    }

    let input = unquote(text[input_at + ACTION_INPUT.len()..].trim());

    ParsedStep::Action {
        name: name.to_string(),
        input: input.to_string(),
    }
}

fn malformed(reason: MalformedReason) -> ParsedStep {
    ParsedStep::Malformed { reason }
}

/// Record where each marker line starts (leading whitespace allowed)
fn find_markers(text: &str) -> Markers {
    let mut markers = Markers::default();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = &line[indent..];
        let at = offset + indent;

        if body.starts_with(ACTION_INPUT) {
            markers.inputs.push(at);
        } else if body.starts_with(ACTION) {
            markers.actions.push(at);
        } else if body.starts_with(FINAL_ANSWER) && markers.final_answer.is_none() {
            markers.final_answer = Some(at);
        }

        offset += line.len();
    }

    markers
}

/// Drop anything from an `Observation:` line onward; the model must not invent tool output
fn strip_hallucinated_observation(text: &str) -> &str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with(OBSERVATION) {
            return &text[..offset];
        }
        offset += line.len();
    }
    text
}

/// Remove one pair of surrounding double quotes
fn unquote(input: &str) -> &str {
    input
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLS: &[&str] = &["Terraform_Knowledge_Base", "Terraform_Apply", "Internet_Search"];

    fn parse(text: &str) -> ParsedStep {
        parse_response(text, TOOLS)
    }

    #[test]
    fn test_action_with_multiline_input() {
        let text = " I should apply the bucket.\nAction: Terraform_Apply\nAction Input: resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}\n";
        assert_eq!(
            parse(text),
            ParsedStep::Action {
                name: "Terraform_Apply".to_string(),
                input: "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}".to_string(),
            }
        );
    }

    #[test]
    fn test_action_input_on_next_line() {
        let text = "Action: Internet_Search\nAction Input:\n\"aws_s3_bucket tags\"";
        assert_eq!(
            parse(text),
            ParsedStep::Action {
                name: "Internet_Search".to_string(),
                input: "aws_s3_bucket tags".to_string(),
            }
        );
    }

    #[test]
    fn test_final_answer() {
        let text = " I now know the final answer\nFinal Answer: The bucket `logs` was created.\nIt has versioning off.";
        assert_eq!(
            parse(text),
            ParsedStep::FinalAnswer {
                text: "The bucket `logs` was created.\nIt has versioning off.".to_string(),
            }
        );
    }

    #[test]
    fn test_both_shapes_are_ambiguous() {
        let text = "Action: Terraform_Apply\nAction Input: resource \"a\" \"b\" {}\nFinal Answer: done";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::Ambiguous
            }
        );
    }

    #[test]
    fn test_raw_code_is_no_decision() {
        let text = "Here is the code:\nresource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::NoDecision
            }
        );
    }

    #[test]
    fn test_action_without_input() {
        let text = "Thought: search first\nAction: Internet_Search";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::MissingActionInput
            }
        );
    }

    #[test]
    fn test_input_before_action() {
        let text = "Action Input: s3\nAction: Internet_Search";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::MissingActionInput
            }
        );
    }

    #[test]
    fn test_input_without_action() {
        let text = "Action Input: resource \"a\" \"b\" {}";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::MissingAction
            }
        );
    }

    #[test]
    fn test_multiple_actions() {
        let text = "Action: Internet_Search\nAction Input: a\nAction: Terraform_Apply\nAction Input: b";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::MultipleActions
            }
        );
    }

    #[test]
    fn test_unknown_tool_is_case_sensitive() {
        let text = "Action: terraform_apply\nAction Input: x";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::UnknownTool("terraform_apply".to_string())
            }
        );
    }

    #[test]
    fn test_empty_action_name() {
        let text = "Action:\nAction Input: x";
        assert_eq!(
            parse(text),
            ParsedStep::Malformed {
                reason: MalformedReason::MissingAction
            }
        );
    }

    #[test]
    fn test_invented_observation_is_ignored() {
        let text = "Action: Terraform_Knowledge_Base\nAction Input: s3 tags\nObservation: made up\nThought: done\nFinal Answer: fake";
        assert_eq!(
            parse(text),
            ParsedStep::Action {
                name: "Terraform_Knowledge_Base".to_string(),
                input: "s3 tags".to_string(),
            }
        );
    }

    #[test]
    fn test_mentions_inside_lines_do_not_count() {
        let text = "I will not use Final Answer: yet.\nAction: Internet_Search\nAction Input: what is an Action: line";
        assert!(matches!(parse(text), ParsedStep::Action { .. }));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            MalformedReason::UnknownTool("Bash".to_string()).to_string(),
            "unknown tool 'Bash'"
        );
    }
}
