use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::runner::CommandOutput;

/// A live channel to the remote host: one command or one file copy at a
/// time. [`crate::SshSession`] is the real implementation; job operations
/// are written against this trait only.
#[async_trait]
pub trait RemoteShell: Send {
    /// `user@host` style label used in logs and errors.
    fn destination(&self) -> &str;

    /// Runs `command` with the remote user's shell, optionally feeding
    /// `stdin`. Fails only when the transport fails.
    async fn exec(&mut self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput>;

    /// Copies a local file to `remote`, replacing it.
    async fn put(&mut self, local: &Path, remote: &str) -> Result<()>;

    /// Copies `remote` to a local file, replacing it.
    async fn get(&mut self, remote: &str, local: &Path) -> Result<()>;

    /// Releases the channel. Later calls fail with a connection error.
    async fn close(&mut self) -> Result<()>;
}
