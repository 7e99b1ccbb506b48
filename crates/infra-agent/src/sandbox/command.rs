//! External process invocation with timeout and output capture

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Outcome of one external process that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit status reported success
    pub succeeded: bool,
    /// Exit code, if the process was not killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Every way a command invocation can end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The process ran and exited
    Completed(CommandResult),
    /// The process could not be started
    LaunchFailed(String),
    /// The process exceeded its time budget and was killed
    TimedOut(Duration),
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, CommandOutcome::Completed(r) if r.succeeded)
    }
}

/// Run `program args..` in `cwd`, capturing stdout and stderr.
///
/// Success is decided by exit status alone; output on stderr does not matter.
pub async fn run_command(program: &Path, args: &[&str], cwd: &Path, limit: Duration) -> CommandOutcome {
    debug!(program = %program.display(), ?args, cwd = %cwd.display(), "Running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .env("TF_IN_AUTOMATION", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => {
            let result = CommandResult {
                succeeded: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            debug!(exit_code = ?result.exit_code, succeeded = result.succeeded, "Command completed");
            CommandOutcome::Completed(result)
        }
        Ok(Err(e)) => {
            warn!(program = %program.display(), error = %e, "Failed to launch command");
            CommandOutcome::LaunchFailed(e.to_string())
        }
        Err(_) => {
            warn!(program = %program.display(), timeout_secs = limit.as_secs(), "Command timed out");
            CommandOutcome::TimedOut(limit)
        }
    }
}
