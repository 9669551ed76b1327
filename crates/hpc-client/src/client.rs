use std::path::Path;

use tokio::sync::Mutex;

use crate::command::RemoteCommand;
use crate::error::Result;
use crate::jobs;
use crate::runner::{self, CommandOutput};
use crate::session::{ClientOptions, SshSession, SshTarget};
use crate::shell::RemoteShell;
use crate::transfer;
use crate::types::{FileContent, JobId, JobSpec, JobStatus, RemoteDirEntry, SubmittedJob};

/// Remote job client bound to a single session.
///
/// Every call holds the session lock for its whole round trip, so commands
/// issued through one client never overlap. Use separate clients for
/// parallel work.
pub struct RemoteJobClient<S = SshSession> {
    shell: Mutex<S>,
}

impl RemoteJobClient<SshSession> {
    pub async fn connect(target: SshTarget, options: ClientOptions) -> Result<Self> {
        let session = SshSession::open(target, options).await?;
        Ok(Self::new(session))
    }
}

impl<S: RemoteShell> RemoteJobClient<S> {
    pub fn new(shell: S) -> Self {
        Self {
            shell: Mutex::new(shell),
        }
    }

    pub fn into_inner(self) -> S {
        self.shell.into_inner()
    }

    pub async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let mut shell = self.shell.lock().await;
        runner::run(&mut *shell, command).await
    }

    pub async fn submit_script(
        &self,
        script_path: &str,
        job_name: Option<&str>,
    ) -> Result<SubmittedJob> {
        let mut shell = self.shell.lock().await;
        jobs::submit_script(&mut *shell, script_path, job_name).await
    }

    pub async fn submit_templated(&self, spec: &JobSpec) -> Result<SubmittedJob> {
        let mut shell = self.shell.lock().await;
        jobs::submit_templated(&mut *shell, spec).await
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobStatus> {
        let mut shell = self.shell.lock().await;
        jobs::status(&mut *shell, job_id).await
    }

    pub async fn list_directory(&self, path: &str) -> Result<Vec<RemoteDirEntry>> {
        let mut shell = self.shell.lock().await;
        jobs::list_directory(&mut *shell, path).await
    }

    pub async fn home_dir(&self) -> Result<String> {
        let mut shell = self.shell.lock().await;
        jobs::home_dir(&mut *shell).await
    }

    pub async fn list_projects(&self, base: &str) -> Result<Vec<String>> {
        let mut shell = self.shell.lock().await;
        jobs::list_projects(&mut *shell, base).await
    }

    pub async fn list_subdirectories(&self, path: &str) -> Result<Vec<String>> {
        let mut shell = self.shell.lock().await;
        jobs::list_subdirectories(&mut *shell, path).await
    }

    pub async fn count_subdirectories(&self, path: &str, depth: u32) -> Result<usize> {
        let mut shell = self.shell.lock().await;
        jobs::count_subdirectories(&mut *shell, path, depth).await
    }

    pub async fn list_files_recursive(&self, path: &str) -> Result<Vec<String>> {
        let mut shell = self.shell.lock().await;
        jobs::list_files_recursive(&mut *shell, path).await
    }

    pub async fn path_exists(&self, path: &str) -> Result<bool> {
        let mut shell = self.shell.lock().await;
        jobs::path_exists(&mut *shell, path).await
    }

    pub async fn make_directory(&self, path: &str) -> Result<()> {
        let mut shell = self.shell.lock().await;
        jobs::make_directory(&mut *shell, path).await
    }

    pub async fn read_file(&self, path: &str, max_lines: usize) -> Result<FileContent> {
        let mut shell = self.shell.lock().await;
        jobs::read_file(&mut *shell, path, max_lines).await
    }

    pub async fn upload_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        let mut shell = self.shell.lock().await;
        transfer::upload_file(&mut *shell, local, remote_path).await
    }

    pub async fn upload_bytes(&self, bytes: &[u8], remote_path: &str) -> Result<()> {
        let mut shell = self.shell.lock().await;
        transfer::upload_bytes(&mut *shell, bytes, remote_path).await
    }

    pub async fn download(&self, remote_path: &str, local: &Path) -> Result<()> {
        let mut shell = self.shell.lock().await;
        transfer::download(&mut *shell, remote_path, local).await
    }

    /// Closes the session. Any later call fails with a connection error.
    pub async fn close(&self) -> Result<()> {
        let mut shell = self.shell.lock().await;
        shell.close().await
    }
}
