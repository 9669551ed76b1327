use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hpc-jobs",
    version,
    about = "Submit and monitor Slurm jobs on a remote cluster over SSH"
)]
pub(crate) struct Args {
    /// TOML config; `config/hpc-jobs.toml` is read when present.
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub(crate) host: Option<String>,
    #[arg(long, global = true)]
    pub(crate) user: Option<String>,
    /// Private key used for authentication.
    #[arg(long, global = true)]
    pub(crate) key: Option<PathBuf>,
    #[arg(long, global = true)]
    pub(crate) port: Option<u16>,
    /// Reject remote paths outside this directory.
    #[arg(long, global = true)]
    pub(crate) project_root: Option<String>,
    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub(crate) json: bool,
    /// Also write JSON logs to a daily rolling file in this directory.
    #[arg(long, global = true)]
    pub(crate) log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// List project directories.
    Projects {
        /// Defaults to `project_root`, then `$HOME/projects`.
        #[arg(long)]
        base: Option<String>,
    },
    /// List a remote directory.
    Ls { path: String },
    /// Print a remote text file; large files are cut to `--max-lines`.
    Cat {
        path: String,
        #[arg(long, default_value_t = 100)]
        max_lines: usize,
    },
    /// Submit a batch script that already exists on the cluster.
    Submit {
        script: String,
        #[arg(long)]
        job_name: Option<String>,
    },
    /// Render, upload and submit a containerized job.
    Run(JobArgs),
    /// Print the batch script `run` would submit, without connecting.
    Render(JobArgs),
    /// Query the scheduler state of a job.
    Status { job_id: String },
    Upload { local: PathBuf, remote: String },
    /// Download a remote file. The local parent directory is created.
    Download { remote: String, local: PathBuf },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct JobArgs {
    /// TOML job template; flags override its values.
    #[arg(long)]
    pub(crate) template: Option<PathBuf>,
    /// Container image the command runs in.
    #[arg(long)]
    pub(crate) image: Option<String>,
    #[arg(long = "command")]
    pub(crate) job_command: Option<String>,
    #[arg(long)]
    pub(crate) name: Option<String>,
    /// Remote working directory; `run` falls back to the remote `$HOME`.
    #[arg(long)]
    pub(crate) workdir: Option<String>,
    #[arg(long)]
    pub(crate) cpus: Option<u32>,
    #[arg(long)]
    pub(crate) memory: Option<String>,
    #[arg(long)]
    pub(crate) gpus: Option<u32>,
    /// Wall-time limit, HH:MM:SS.
    #[arg(long)]
    pub(crate) time: Option<String>,
    #[arg(long)]
    pub(crate) output_log: Option<String>,
}
