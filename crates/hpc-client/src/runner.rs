use serde::Serialize;
use tracing::debug;

use crate::command::{RemoteCommand, DONE_MARKER};
use crate::error::Result;
use crate::shell::RemoteShell;

/// Captured streams of one remote command, decoded lossily and trimmed of
/// trailing whitespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into().trim_end().to_string(),
            stderr: stderr.into().trim_end().to_string(),
        }
    }

    pub fn from_bytes(stdout: &[u8], stderr: &[u8]) -> Self {
        Self::new(
            String::from_utf8_lossy(stdout),
            String::from_utf8_lossy(stderr),
        )
    }

    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Whether a [`RemoteCommand::confirmed`] command ran to the end.
    pub fn is_confirmed(&self) -> bool {
        self.stdout.lines().last().map(str::trim) == Some(DONE_MARKER)
    }
}

/// Runs one command over `shell`. Remote exit codes are not inspected and a
/// non-empty stderr is only logged; deciding what counts as failure is up to
/// the caller.
pub async fn run<S: RemoteShell + ?Sized>(
    shell: &mut S,
    command: &RemoteCommand,
) -> Result<CommandOutput> {
    run_with_input(shell, command, None).await
}

pub async fn run_with_input<S: RemoteShell + ?Sized>(
    shell: &mut S,
    command: &RemoteCommand,
    stdin: Option<&[u8]>,
) -> Result<CommandOutput> {
    debug!(
        event = "remote.exec",
        destination = %shell.destination(),
        command = %command,
        "running remote command"
    );
    let output = shell.exec(command.as_str(), stdin).await?;
    if !output.stderr.is_empty() {
        debug!(
            event = "remote.stderr",
            command = %command,
            stderr = %output.stderr,
            "remote command wrote to stderr"
        );
    }
    Ok(output)
}
