use std::process::{Output, Stdio};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Runs `cmd` to completion, feeding `stdin` when given and capturing both
/// output streams. The child is killed if it outlives `command_timeout`.
pub async fn run_command_with_timeout(
    cmd: &mut Command,
    stdin: Option<&[u8]>,
    command_timeout: Duration,
    label: &str,
) -> anyhow::Result<Output> {
    let stdin_mode = if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    cmd.stdin(stdin_mode)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {label}"))?;
    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let io = async {
        let write = async {
            if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, stdin) {
                pipe.write_all(bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (written, stdout, stderr) =
            tokio::join!(write, read_pipe(stdout_pipe), read_pipe(stderr_pipe));
        let status = child.wait().await?;
        written?;
        Ok::<Output, std::io::Error>(Output {
            status,
            stdout: stdout?,
            stderr: stderr?,
        })
    };

    match timeout(command_timeout, io).await {
        Ok(result) => result.with_context(|| format!("{label} failed")),
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            anyhow::bail!(
                "{label} timed out after {}s",
                command_timeout.as_secs()
            )
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg("printf out; printf err >&2");
            let output = run_command_with_timeout(&mut cmd, None, Duration::from_secs(5), "sh")
                .await
                .expect("output");
            assert!(output.status.success());
            assert_eq!(output.stdout, b"out");
            assert_eq!(output.stderr, b"err");
        });
    }

    #[test]
    fn feeds_stdin() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let mut cmd = Command::new("cat");
            let output = run_command_with_timeout(
                &mut cmd,
                Some(b"hello from stdin".as_slice()),
                Duration::from_secs(5),
                "cat",
            )
            .await
            .expect("output");
            assert_eq!(output.stdout, b"hello from stdin");
        });
    }

    #[test]
    fn times_out_slow_commands() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let mut cmd = Command::new("sleep");
            cmd.arg("5");
            let err = run_command_with_timeout(&mut cmd, None, Duration::from_millis(100), "sleep")
                .await
                .expect_err("timeout");
            assert!(err.to_string().contains("timed out"));
        });
    }
}
