use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::process::Command;

use system_utils::process::run_command_with_timeout;

use crate::command::shell_escape;
use crate::error::{HpcError, Result};
use crate::runner::CommandOutput;
use crate::shell::RemoteShell;

pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{prefix}-{nanos}"));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Runs "remote" commands with the local `bash`, with `bin_dir` first on
/// `PATH` so tests can drop in fake scheduler binaries.
pub(crate) struct LocalShell {
    bin_dir: PathBuf,
    closed: bool,
}

impl LocalShell {
    /// `bin_dir` is created next to `root`, not inside it, so listings of
    /// `root` only show what the test put there.
    pub(crate) fn new(root: &Path) -> Self {
        let bin_dir = PathBuf::from(format!("{}-bin", root.display()));
        fs::create_dir_all(&bin_dir).expect("create bin dir");
        Self {
            bin_dir,
            closed: false,
        }
    }

    pub(crate) fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }
}

#[async_trait]
impl RemoteShell for LocalShell {
    fn destination(&self) -> &str {
        "local"
    }

    async fn exec(&mut self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        if self.closed {
            return Err(HpcError::closed("local"));
        }
        let path = format!(
            "{}:{}",
            self.bin_dir.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command).env("PATH", path);
        let output = run_command_with_timeout(&mut cmd, stdin, Duration::from_secs(30), "bash")
            .await
            .map_err(|err| HpcError::RemoteExecution {
                command: command.to_string(),
                message: format!("{err:#}"),
            })?;
        Ok(CommandOutput::from_bytes(&output.stdout, &output.stderr))
    }

    async fn put(&mut self, local: &Path, remote: &str) -> Result<()> {
        if self.closed {
            return Err(HpcError::closed("local"));
        }
        tokio::fs::copy(local, remote)
            .await
            .map(|_| ())
            .map_err(|err| HpcError::transfer(remote, err.to_string()))
    }

    async fn get(&mut self, remote: &str, local: &Path) -> Result<()> {
        if self.closed {
            return Err(HpcError::closed("local"));
        }
        tokio::fs::copy(remote, local)
            .await
            .map(|_| ())
            .map_err(|err| HpcError::transfer(remote, err.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Replays canned outputs in order and records every command it was asked
/// to run.
pub(crate) struct ScriptedShell {
    responses: VecDeque<CommandOutput>,
    pub(crate) commands: Vec<String>,
}

impl ScriptedShell {
    pub(crate) fn new(responses: Vec<CommandOutput>) -> Self {
        Self {
            responses: responses.into(),
            commands: Vec::new(),
        }
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    fn destination(&self) -> &str {
        "scripted"
    }

    async fn exec(&mut self, command: &str, _stdin: Option<&[u8]>) -> Result<CommandOutput> {
        self.commands.push(command.to_string());
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    async fn put(&mut self, _local: &Path, _remote: &str) -> Result<()> {
        Ok(())
    }

    async fn get(&mut self, _remote: &str, _local: &Path) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Installs `sbatch` and `squeue` stand-ins. `sbatch` records its arguments
/// in `sbatch.args` next to itself.
pub(crate) fn install_fake_scheduler(shell: &LocalShell, sbatch_stdout: &str, squeue_stdout: &str) {
    let sbatch = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > \"$(dirname \"$0\")/sbatch.args\"\nprintf '%s\\n' {}\n",
        shell_escape(sbatch_stdout)
    );
    let squeue = format!("#!/bin/sh\nprintf '%s\\n' {}\n", shell_escape(squeue_stdout));
    for (name, body) in [("sbatch", sbatch), ("squeue", squeue)] {
        let path = shell.bin_dir().join(name);
        fs::write(&path, body).expect("write fake scheduler");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).expect("chmod");
        }
    }
}
