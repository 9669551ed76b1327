//! One OpenSSH control master per session.
//!
//! Commands and file copies are multiplexed over the master's control
//! socket, so authentication happens once in [`SshSession::open`] and
//! everything afterwards rides the same connection.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use system_utils::path::{absolutize, expand_tilde};
use system_utils::process::run_command_with_timeout;
use system_utils::ssh::{
    apply_control_options, apply_ssh_options, control_path_for, format_ssh_failure,
    SSH_FAILURE_STATUS,
};

use crate::error::{HpcError, Result};
use crate::runner::CommandOutput;
use crate::shell::RemoteShell;

const CONTROL_SOCKET_WAIT_INTERVAL: Duration = Duration::from_millis(50);
const MASTER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    /// Private key. `~` is expanded and relative paths are resolved against
    /// the current directory when the session opens.
    pub identity_file: PathBuf,
    pub port: Option<u16>,
    /// Extra `-o` options, e.g. `ServerAliveInterval=60`.
    pub ssh_options: Vec<String>,
}

impl SshTarget {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        identity_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            identity_file: identity_file.into(),
            port: None,
            ssh_options: Vec::new(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub transfer_timeout: Duration,
    pub control_dir: PathBuf,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(120),
            control_dir: expand_tilde("~/.hpc-jobs/control"),
        }
    }
}

pub struct SshSession {
    target: SshTarget,
    destination: String,
    control_path: PathBuf,
    options: ClientOptions,
    master: Option<Child>,
}

impl SshSession {
    /// Starts the control master, waits for its socket and confirms it with
    /// `ssh -O check`. Nothing is returned unless the session is usable.
    pub async fn open(target: SshTarget, options: ClientOptions) -> Result<Self> {
        let destination = target.destination();
        let connection_error = |message: String| HpcError::Connection {
            destination: destination.clone(),
            message,
        };
        if target.host.trim().is_empty() || target.user.trim().is_empty() {
            return Err(connection_error("host and user must not be empty".to_string()));
        }
        let identity_file = absolutize(&target.identity_file).map_err(|err| {
            connection_error(format!(
                "failed to resolve identity file {}: {err}",
                target.identity_file.display()
            ))
        })?;
        std::fs::create_dir_all(&options.control_dir).map_err(|err| {
            connection_error(format!(
                "failed to create {}: {err}",
                options.control_dir.display()
            ))
        })?;
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        let control_path = control_path_for(
            &options.control_dir,
            &format!("{destination}:{}:{seq}", std::process::id()),
        );
        let _ = std::fs::remove_file(&control_path);

        info!(
            event = "ssh.connect",
            destination = %destination,
            identity_file = %identity_file.display(),
            "opening ssh session"
        );
        let mut cmd = Command::new("ssh");
        cmd.arg("-N")
            .arg("-T")
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-o")
            .arg("ServerAliveInterval=30")
            .arg("-o")
            .arg("ServerAliveCountMax=3");
        apply_ssh_options(&mut cmd, options.connect_timeout);
        cmd.arg("-i").arg(&identity_file);
        apply_target_options(&mut cmd, &target, "-p");
        cmd.arg(&destination);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|err| connection_error(format!("failed to spawn ssh: {err}")))?;

        let mut ready =
            wait_for_control_socket(&mut child, &control_path, options.connect_timeout).await;
        if ready.is_ok() {
            ready = check_master(&control_path, &destination, options.connect_timeout).await;
        }
        if let Err(message) = ready {
            let _ = child.kill().await;
            let _ = child.wait().await;
            let _ = std::fs::remove_file(&control_path);
            warn!(event = "ssh.connect_failed", destination = %destination, error = %message);
            return Err(connection_error(message));
        }
        info!(event = "ssh.connected", destination = %destination, "ssh session ready");

        Ok(Self {
            target,
            destination,
            control_path,
            options,
            master: Some(child),
        })
    }

    pub fn is_open(&self) -> bool {
        self.master.is_some()
    }

    /// Fails with a connection error unless the master is still running.
    /// A dead master is never restarted here.
    fn ensure_open(&mut self) -> Result<()> {
        let Some(master) = self.master.as_mut() else {
            return Err(HpcError::closed(&self.destination));
        };
        match master.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                self.master = None;
                Err(HpcError::Connection {
                    destination: self.destination.clone(),
                    message: format!("ssh master exited ({status})"),
                })
            }
            Err(err) => {
                self.master = None;
                Err(HpcError::Connection {
                    destination: self.destination.clone(),
                    message: format!("ssh master status check failed: {err}"),
                })
            }
        }
    }

    fn client_command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        apply_control_options(&mut cmd, &self.control_path);
        apply_ssh_options(&mut cmd, self.options.connect_timeout);
        cmd
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.destination, path)
    }

    async fn scp(&mut self, source: &str, dest: &str, path_label: &str) -> Result<()> {
        self.ensure_open()?;
        let mut cmd = self.client_command("scp");
        cmd.arg("-q").arg("-B");
        apply_target_options(&mut cmd, &self.target, "-P");
        cmd.arg("--").arg(source).arg(dest);
        let output = run_command_with_timeout(&mut cmd, None, self.options.transfer_timeout, "scp")
            .await
            .map_err(|err| HpcError::transfer(path_label, format!("{err:#}")))?;
        if !output.status.success() {
            return Err(HpcError::transfer(
                path_label,
                format_ssh_failure("scp", &output.stdout, &output.stderr),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    fn destination(&self) -> &str {
        &self.destination
    }

    async fn exec(&mut self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        self.ensure_open()?;
        let mut cmd = self.client_command("ssh");
        cmd.arg("-T");
        apply_target_options(&mut cmd, &self.target, "-p");
        cmd.arg(&self.destination).arg(command);
        let output =
            run_command_with_timeout(&mut cmd, stdin, self.options.command_timeout, "ssh command")
                .await
                .map_err(|err| HpcError::RemoteExecution {
                    command: command.to_string(),
                    message: format!("{err:#}"),
                })?;
        match output.status.code() {
            Some(SSH_FAILURE_STATUS) | None => Err(HpcError::RemoteExecution {
                command: command.to_string(),
                message: format_ssh_failure("ssh", &output.stdout, &output.stderr),
            }),
            Some(code) => {
                debug!(event = "ssh.exec", exit_code = code, "remote command finished");
                Ok(CommandOutput::from_bytes(&output.stdout, &output.stderr))
            }
        }
    }

    async fn put(&mut self, local: &Path, remote: &str) -> Result<()> {
        let dest = self.remote_spec(remote);
        self.scp(&local.to_string_lossy(), &dest, remote).await
    }

    async fn get(&mut self, remote: &str, local: &Path) -> Result<()> {
        let source = self.remote_spec(remote);
        self.scp(&source, &local.to_string_lossy(), remote).await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut master) = self.master.take() else {
            return Ok(());
        };
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg("exit")
            .arg(&self.destination);
        if let Err(err) =
            run_command_with_timeout(&mut cmd, None, MASTER_EXIT_TIMEOUT, "ssh -O exit").await
        {
            debug!(event = "ssh.exit_failed", error = %err, "control master did not exit cleanly");
        }
        match master.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                let _ = master.kill().await;
                let _ = master.wait().await;
            }
        }
        let _ = std::fs::remove_file(&self.control_path);
        info!(event = "ssh.closed", destination = %self.destination, "ssh session closed");
        Ok(())
    }
}

fn apply_target_options(cmd: &mut Command, target: &SshTarget, port_flag: &str) {
    if let Some(port) = target.port {
        cmd.arg(port_flag).arg(port.to_string());
    }
    for option in &target.ssh_options {
        cmd.arg("-o").arg(option);
    }
}

async fn wait_for_control_socket(
    child: &mut Child,
    control_path: &Path,
    connect_timeout: Duration,
) -> std::result::Result<(), String> {
    let start = Instant::now();
    loop {
        if control_path.exists() {
            return Ok(());
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stderr = Vec::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_end(&mut stderr).await;
                }
                let mut message = format_ssh_failure("ssh", b"", &stderr);
                if stderr.is_empty() {
                    message.push_str(&format!(" ({status})"));
                }
                return Err(message);
            }
            Ok(None) => {}
            Err(err) => return Err(format!("failed to poll ssh master: {err}")),
        }
        if start.elapsed() >= connect_timeout {
            return Err(format!("no connection after {connect_timeout:?}"));
        }
        tokio::time::sleep(CONTROL_SOCKET_WAIT_INTERVAL).await;
    }
}

/// Asks the master whether it is serving its control socket.
async fn check_master(
    control_path: &Path,
    destination: &str,
    timeout: Duration,
) -> std::result::Result<(), String> {
    let mut cmd = Command::new("ssh");
    cmd.arg("-S")
        .arg(control_path)
        .arg("-O")
        .arg("check")
        .arg(destination);
    let output = run_command_with_timeout(&mut cmd, None, timeout, "ssh -O check")
        .await
        .map_err(|err| format!("{err:#}"))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(format_ssh_failure("ssh -O check", &output.stdout, &output.stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_dir;

    fn unreachable_target() -> SshTarget {
        let mut target = SshTarget::new("", "alice", "~/.ssh/id_rsa");
        target.port = Some(2222);
        target
    }

    #[test]
    fn destination_is_user_at_host() {
        let target = SshTarget::new("login1.cluster.example", "alice", "/keys/id");
        assert_eq!(target.destination(), "alice@login1.cluster.example");
    }

    #[test]
    fn default_options_match_documented_timeouts() {
        let options = ClientOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.command_timeout, Duration::from_secs(30));
        assert_eq!(options.transfer_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn open_rejects_empty_host() {
        let options = ClientOptions {
            control_dir: temp_dir("hpc-session"),
            ..ClientOptions::default()
        };
        let err = SshSession::open(unreachable_target(), options)
            .await
            .err()
            .expect("empty host must fail");
        assert!(matches!(err, HpcError::Connection { .. }));
    }

    #[test]
    fn target_options_use_program_specific_port_flag() {
        let mut target = SshTarget::new("h", "u", "/k");
        target.port = Some(2222);
        target.ssh_options = vec!["ServerAliveInterval=60".to_string()];
        let mut cmd = Command::new("scp");
        apply_target_options(&mut cmd, &target, "-P");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, ["-P", "2222", "-o", "ServerAliveInterval=60"]);
    }

    fn session_with_master(master: Option<Child>) -> SshSession {
        let target = SshTarget::new("login1.cluster.example", "alice", "/keys/id");
        let control_dir = temp_dir("hpc-session-control");
        SshSession {
            destination: target.destination(),
            control_path: control_path_for(&control_dir, "test"),
            target,
            options: ClientOptions {
                control_dir,
                ..ClientOptions::default()
            },
            master,
        }
    }

    fn spawn(program: &str, args: &[&str]) -> Child {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn")
    }

    #[tokio::test]
    async fn socket_wait_gives_up_after_connect_timeout() {
        let dir = temp_dir("hpc-session-wait");
        let mut child = spawn("sleep", &["5"]);
        let started = Instant::now();
        let message = wait_for_control_socket(
            &mut child,
            &dir.join("never.sock"),
            Duration::from_millis(200),
        )
        .await
        .expect_err("socket never appears");
        assert!(message.contains("no connection after"), "{message}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn socket_wait_reports_master_that_exited() {
        let dir = temp_dir("hpc-session-exit");
        let mut child = spawn("false", &[]);
        let message = wait_for_control_socket(
            &mut child,
            &dir.join("never.sock"),
            Duration::from_secs(5),
        )
        .await
        .expect_err("master exited");
        assert!(message.starts_with("ssh failed"), "{message}");
    }

    #[tokio::test]
    async fn socket_wait_succeeds_once_socket_exists() {
        let dir = temp_dir("hpc-session-ready");
        let socket = dir.join("ready.sock");
        std::fs::write(&socket, b"").expect("socket stand-in");
        let mut child = spawn("sleep", &["5"]);
        wait_for_control_socket(&mut child, &socket, Duration::from_millis(200))
            .await
            .expect("ready");
    }

    #[tokio::test]
    async fn master_check_fails_without_a_live_master() {
        let dir = temp_dir("hpc-session-check");
        let result = check_master(
            &dir.join("missing.sock"),
            "alice@login1.invalid",
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn closed_session_rejects_every_operation() {
        let mut session = session_with_master(None);
        assert!(!session.is_open());
        session.close().await.expect("close is idempotent");
        let err = session.exec("true", None).await.expect_err("closed");
        assert!(matches!(err, HpcError::Connection { .. }));
        let err = session
            .get("/remote/file", Path::new("/tmp/unused"))
            .await
            .expect_err("closed");
        assert!(matches!(err, HpcError::Connection { .. }));
    }

    #[tokio::test]
    async fn dead_master_is_reported_and_not_restarted() {
        let mut master = spawn("true", &[]);
        master.wait().await.expect("wait");
        let mut session = session_with_master(Some(master));
        let err = session.ensure_open().expect_err("master gone");
        match err {
            HpcError::Connection { message, .. } => assert!(message.contains("master exited")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.is_open());
        assert!(matches!(
            session.ensure_open(),
            Err(HpcError::Connection { .. })
        ));
    }
}
