//! Whole-file copies over the session.
//!
//! Copies are not resumable and not atomic: a failed copy can leave a
//! partial file at the destination, which callers must treat as garbage.

use std::path::Path;

use tracing::info;

use crate::command::RemoteCommand;
use crate::error::{HpcError, Result};
use crate::runner::run_with_input;
use crate::shell::RemoteShell;

pub async fn upload_file<S: RemoteShell + ?Sized>(
    shell: &mut S,
    local: &Path,
    remote_path: &str,
) -> Result<()> {
    let metadata = tokio::fs::metadata(local).await.map_err(|err| {
        HpcError::transfer(
            local.display().to_string(),
            format!("failed to read local file: {err}"),
        )
    })?;
    if !metadata.is_file() {
        return Err(HpcError::transfer(
            local.display().to_string(),
            "not a regular file",
        ));
    }
    info!(
        event = "transfer.upload",
        local = %local.display(),
        remote = %remote_path,
        bytes = metadata.len(),
        "uploading file"
    );
    shell.put(local, remote_path).await
}

/// Writes `bytes` to `remote_path`, creating its parent directory.
pub async fn upload_bytes<S: RemoteShell + ?Sized>(
    shell: &mut S,
    bytes: &[u8],
    remote_path: &str,
) -> Result<()> {
    info!(
        event = "transfer.upload",
        remote = %remote_path,
        bytes = bytes.len(),
        "uploading content"
    );
    let command = RemoteCommand::write_file(remote_path).confirmed();
    let output = run_with_input(shell, &command, Some(bytes))
        .await
        .map_err(|err| match err {
            HpcError::RemoteExecution { message, .. } => {
                HpcError::transfer(remote_path, message)
            }
            other => other,
        })?;
    if !output.is_confirmed() {
        let message = if output.stderr.is_empty() {
            "remote write did not complete".to_string()
        } else {
            output.stderr
        };
        return Err(HpcError::transfer(remote_path, message));
    }
    Ok(())
}

/// Copies `remote_path` to `local`. The local parent directory must already
/// exist.
pub async fn download<S: RemoteShell + ?Sized>(
    shell: &mut S,
    remote_path: &str,
    local: &Path,
) -> Result<()> {
    info!(
        event = "transfer.download",
        remote = %remote_path,
        local = %local.display(),
        "downloading file"
    );
    shell.get(remote_path, local).await
}
