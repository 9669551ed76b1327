//! Client for submitting and monitoring Slurm jobs over SSH.
//!
//! A [`RemoteJobClient`] owns one SSH session. It renders batch scripts,
//! ships them to the cluster, drives `sbatch`/`squeue`, and moves files in
//! and out over the same connection.

mod client;
pub mod command;
mod error;
pub mod jobs;
pub mod listing;
pub mod paths;
pub mod runner;
pub mod script;
mod session;
mod shell;
pub mod transfer;
mod types;

#[cfg(test)]
mod test_utils;

pub use client::RemoteJobClient;
pub use command::RemoteCommand;
pub use error::{HpcError, Result};
pub use runner::CommandOutput;
pub use script::render;
pub use session::{ClientOptions, SshSession, SshTarget};
pub use shell::RemoteShell;
pub use types::{
    FileContent, JobId, JobSpec, JobStatus, RemoteDirEntry, Resources, SubmittedJob,
    DEFAULT_OUTPUT_LOG,
};
