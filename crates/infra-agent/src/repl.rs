//! Interactive REPL: one goal per line, each run to completion before the next prompt

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};
use llm_core::Config;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::RunOutcome;
use crate::commands::{cancel_on_ctrl_c, print_report};
use crate::session::{Session, SessionOptions};

// ANSI colors
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Line-editor history file under the user data directory
struct InputHistory {
    path: PathBuf,
}

impl InputHistory {
    fn new() -> Result<Self> {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("infra-agent");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("history"),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Summary of the previous run, for `/status`
struct LastRun {
    finished_at: DateTime<Local>,
    outcome: RunOutcome,
    model_calls: usize,
}

struct ReplState {
    session: Session,
    last_run: Option<LastRun>,
}

/// What the REPL does with one input line
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Exit,
    Command(&'a str),
    Goal(&'a str),
    Empty,
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Input::Exit;
    }
    if line.starts_with('/') {
        return Input::Command(line);
    }
    Input::Goal(line)
}

/// Run the interactive REPL
pub async fn run(config: Config, opts: SessionOptions) -> Result<()> {
    let mut state = ReplState {
        session: Session::build(config, opts)?,
        last_run: None,
    };

    let history = InputHistory::new()?;
    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(history.path());

    print_welcome(&state.session);

    loop {
        let prompt = format!("{}infra>{} ", CYAN, RESET);

        match rl.readline(&prompt) {
            Ok(line) => {
                let input = classify(&line);
                if input != Input::Empty {
                    let _ = rl.add_history_entry(line.trim());
                }

                match input {
                    Input::Empty => continue,
                    Input::Exit => break,
                    Input::Command(cmd) => {
                        if handle_slash_command(&mut state, cmd).await {
                            break;
                        }
                    }
                    Input::Goal(goal) => {
                        run_goal(&mut state, goal).await;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}(Use exit or /quit to leave){}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(history.path()) {
        debug!(error = %e, "Failed to save REPL history");
    }
    println!("{}Goodbye!{}", DIM, RESET);
    Ok(())
}

async fn run_goal(state: &mut ReplState, goal: &str) {
    info!(goal_len = goal.len(), "Starting run");

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);
    let report = state.session.run_goal(goal, &cancel).await;
    watcher.abort();

    print_report(&report);

    let cancelled = report.outcome == RunOutcome::Cancelled;
    state.last_run = Some(LastRun {
        finished_at: Local::now(),
        outcome: report.outcome,
        model_calls: report.model_calls,
    });

    // Pause between runs to stay under provider rate limits
    let cooldown = state.session.cooldown();
    if !cancelled && !cooldown.is_zero() {
        println!("{}Cooling down for {}s...{}", DIM, cooldown.as_secs(), RESET);
        tokio::time::sleep(cooldown).await;
    }
}

/// Handle a slash command; returns true when the REPL should exit
async fn handle_slash_command(state: &mut ReplState, line: &str) -> bool {
    let cmd = line.split_whitespace().next().unwrap_or(line);

    match cmd {
        "/exit" | "/quit" | "/q" => return true,
        "/help" | "/h" | "/?" => print_help(),
        "/tools" => {
            for tool in state.session.agent().router().registry().all_tools() {
                println!(
                    "  {}{}{} [{}]\n    {}{}{}",
                    BOLD,
                    tool.name(),
                    RESET,
                    tool.security_level(),
                    DIM,
                    tool.description(),
                    RESET
                );
            }
        }
        "/destroy" => {
            println!("{}Destroying resources in {}...{}", YELLOW, state.session.sandbox().working_dir().display(), RESET);
            println!("{}", state.session.destroy().await);
        }
        "/status" => print_status(state),
        _ => {
            println!("{}Unknown command:{} {}", YELLOW, RESET, cmd);
            println!("Type /help for available commands.");
        }
    }
    false
}

fn print_status(state: &ReplState) {
    let session = &state.session;
    let agent = session.agent().config();

    println!("{}Session{}", BOLD, RESET);
    println!("  Model: {}", session.backend_name());
    println!("  Working dir: {}", session.sandbox().working_dir().display());
    println!("  Knowledge chunks: {}", session.knowledge_chunks());
    println!("  Rules loaded: {}", if session.has_rules() { "yes" } else { "no" });
    println!("  Max steps: {}", agent.max_steps);
    println!("  Auto mode: {}", if agent.auto_mode { "yes" } else { "no" });

    match &state.last_run {
        Some(run) => {
            let marker = if run.outcome.is_success() {
                format!("{}ok{}", GREEN, RESET)
            } else {
                format!("{}failed{}", YELLOW, RESET)
            };
            println!(
                "  Last run: {} at {} ({} model calls)",
                marker,
                run.finished_at.format("%H:%M:%S"),
                run.model_calls
            );
        }
        None => println!("  Last run: none"),
    }
}

fn print_help() {
    println!(
        r#"
{}Commands:{}
  {}/help{}       Show this help
  {}/tools{}      List the tools the agent can use
  {}/status{}     Show session settings and the last run
  {}/destroy{}    Run terraform destroy in the working directory
  {}/exit{}       Leave (also: exit, quit, Ctrl-D)

Anything else is sent to the agent as a goal. Ctrl-C cancels a running goal.
"#,
        BOLD, RESET, CYAN, RESET, CYAN, RESET, CYAN, RESET, CYAN, RESET, CYAN, RESET
    );
}

fn print_welcome(session: &Session) {
    println!();
    println!("{}╭─────────────────────────────────────╮{}", CYAN, RESET);
    println!("{}│{}  {}infra-agent{} - Terraform on AWS     {}│{}", CYAN, RESET, BOLD, RESET, CYAN, RESET);
    println!("{}╰─────────────────────────────────────╯{}", CYAN, RESET);
    println!();
    println!("  Model: {}{}{}", GREEN, session.backend_name(), RESET);
    println!("  Working dir: {}", session.sandbox().working_dir().display());
    println!("  Type {}/help{} for commands, {}exit{} to leave", CYAN, RESET, CYAN, RESET);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_input() {
        assert_eq!(classify("   "), Input::Empty);
        assert_eq!(classify("exit"), Input::Exit);
        assert_eq!(classify(" QUIT "), Input::Exit);
        assert_eq!(classify("/tools"), Input::Command("/tools"));
        assert_eq!(
            classify("  create an s3 bucket  "),
            Input::Goal("create an s3 bucket")
        );
        assert_eq!(classify("exit the vpc"), Input::Goal("exit the vpc"));
    }
}
