use std::io::Write;

use anyhow::Context;
use hpc_client::paths::{is_within_root, join_remote_path};
use hpc_client::{JobId, JobSpec, RemoteJobClient, RemoteShell};

use crate::cli::{Command, JobArgs};
use crate::config::{load_job_template, JobTemplate};
use crate::output::Printer;

/// Settings every subcommand may consult, resolved from flags and the
/// config file.
#[derive(Debug, Default)]
pub(crate) struct Settings {
    pub(crate) project_root: Option<String>,
    pub(crate) defaults: JobTemplate,
}

/// Rejects `path` when a project root is configured and the path resolves
/// outside it.
pub(crate) fn ensure_within_root(root: Option<&str>, path: &str) -> anyhow::Result<()> {
    match root {
        Some(root) if !is_within_root(root, path) => {
            anyhow::bail!("remote path {path} is outside project root {root}")
        }
        _ => Ok(()),
    }
}

/// Layers `[defaults]`, the template file and flags. `fallback_workdir`
/// fills the working directory when none of them set it.
pub(crate) fn build_job(
    defaults: &JobTemplate,
    args: &JobArgs,
    fallback_workdir: Option<String>,
) -> anyhow::Result<JobSpec> {
    let mut job = defaults.clone();
    if let Some(path) = &args.template {
        job = job.overlay(load_job_template(path)?);
    }
    job = job.overlay(JobTemplate::from_args(args));
    if job.working_directory.is_none() {
        job.working_directory = fallback_workdir;
    }
    job.into_spec()
}

/// `render` is the only subcommand that needs no connection.
pub(crate) fn render<W: Write>(
    settings: &Settings,
    args: &JobArgs,
    printer: &mut Printer<W>,
) -> anyhow::Result<()> {
    let spec = build_job(&settings.defaults, args, None)?;
    printer.script(&hpc_client::render(&spec))
}

pub(crate) async fn dispatch<S: RemoteShell, W: Write>(
    client: &RemoteJobClient<S>,
    command: Command,
    settings: &Settings,
    printer: &mut Printer<W>,
) -> anyhow::Result<()> {
    let root = settings.project_root.as_deref();
    match command {
        Command::Projects { base } => {
            let base = match base.or_else(|| settings.project_root.clone()) {
                Some(base) => base,
                None => {
                    let home = client.home_dir().await.context("failed to resolve $HOME")?;
                    join_remote_path(&home, "projects")
                }
            };
            ensure_within_root(root, &base)?;
            let projects = client
                .list_projects(&base)
                .await
                .with_context(|| format!("failed to list projects in {base}"))?;
            printer.names(&projects)
        }
        Command::Ls { path } => {
            ensure_within_root(root, &path)?;
            let entries = client
                .list_directory(&path)
                .await
                .with_context(|| format!("failed to list {path}"))?;
            printer.entries(&entries)
        }
        Command::Cat { path, max_lines } => {
            ensure_within_root(root, &path)?;
            let content = client
                .read_file(&path, max_lines)
                .await
                .with_context(|| format!("failed to read {path}"))?;
            printer.file(&content)
        }
        Command::Submit { script, job_name } => {
            ensure_within_root(root, &script)?;
            let job = client
                .submit_script(&script, job_name.as_deref())
                .await
                .with_context(|| format!("failed to submit {script}"))?;
            printer.submitted(&job)
        }
        Command::Run(args) => {
            let fallback = if args.workdir.is_some() {
                None
            } else {
                Some(client.home_dir().await.context("failed to resolve $HOME")?)
            };
            let spec = build_job(&settings.defaults, &args, fallback)?;
            ensure_within_root(root, &spec.working_directory)?;
            let job = client
                .submit_templated(&spec)
                .await
                .with_context(|| format!("failed to submit job {}", spec.name))?;
            printer.submitted(&job)
        }
        Command::Render(args) => render(settings, &args, printer),
        Command::Status { job_id } => {
            let job_id = JobId::parse(&job_id)
                .with_context(|| format!("invalid job id {job_id:?}; expected digits"))?;
            let status = client
                .status(&job_id)
                .await
                .with_context(|| format!("failed to query job {job_id}"))?;
            printer.status(&job_id, &status)
        }
        Command::Upload { local, remote } => {
            ensure_within_root(root, &remote)?;
            client
                .upload_file(&local, &remote)
                .await
                .with_context(|| format!("failed to upload {}", local.display()))?;
            printer.transferred(&local.display().to_string(), &remote)
        }
        Command::Download { remote, local } => {
            ensure_within_root(root, &remote)?;
            if let Some(parent) = local.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            client
                .download(&remote, &local)
                .await
                .with_context(|| format!("failed to download {remote}"))?;
            printer.transferred(&remote, &local.display().to_string())
        }
    }
}
