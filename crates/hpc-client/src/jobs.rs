//! Job submission, status queries and remote browsing.
//!
//! The scheduler owns each job's lifecycle
//! (`PENDING`/`RUNNING` → `COMPLETED`/`FAILED`/`CANCELLED`); nothing here
//! keeps per-job state between calls.

use tracing::{debug, info};

use crate::command::{RemoteCommand, MISSING_MARKER};
use crate::error::{HpcError, Result};
use crate::listing::parse_long_listing;
use crate::runner::run;
use crate::script::{render, script_path};
use crate::shell::RemoteShell;
use crate::transfer::upload_bytes;
use crate::types::{FileContent, JobId, JobSpec, JobStatus, RemoteDirEntry, SubmittedJob};

/// Files above this size are previewed with `head` instead of read whole.
pub const READ_FILE_LIMIT: u64 = 1_000_000;

/// Takes the last whitespace-separated token of `sbatch` output as the job
/// id, e.g. `Submitted batch job 88210`.
pub fn parse_job_id(stdout: &str) -> Option<JobId> {
    stdout.split_whitespace().last().and_then(JobId::parse)
}

/// Submits a script that already exists on the remote host.
pub async fn submit_script<S: RemoteShell + ?Sized>(
    shell: &mut S,
    script_path: &str,
    job_name: Option<&str>,
) -> Result<SubmittedJob> {
    let command = RemoteCommand::submit(script_path, job_name);
    let output = run(shell, &command).await?;
    let Some(job_id) = parse_job_id(&output.stdout) else {
        return Err(HpcError::Submission {
            command: command.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    };
    info!(
        event = "job.submit",
        job_id = %job_id,
        script = %script_path,
        "submitted batch job"
    );
    Ok(SubmittedJob {
        job_id,
        remote_script: None,
    })
}

/// Renders `spec`, uploads it to `{working_directory}/{name}.sh` and submits
/// it.
pub async fn submit_templated<S: RemoteShell + ?Sized>(
    shell: &mut S,
    spec: &JobSpec,
) -> Result<SubmittedJob> {
    spec.validate()?;
    let script = render(spec);
    let remote_script = script_path(spec);
    upload_bytes(shell, script.as_bytes(), &remote_script).await?;
    let mut job = submit_script(shell, &remote_script, None).await?;
    job.remote_script = Some(remote_script);
    Ok(job)
}

pub async fn status<S: RemoteShell + ?Sized>(shell: &mut S, job_id: &JobId) -> Result<JobStatus> {
    let output = run(shell, &RemoteCommand::job_state(job_id)).await?;
    if output.stdout.trim().is_empty() {
        // squeue forgets finished jobs; a failed-then-purged job looks the same.
        debug!(
            event = "job.status_empty",
            job_id = %job_id,
            stderr = %output.stderr,
            "job not in queue, reporting COMPLETED"
        );
    }
    Ok(JobStatus::from_query_output(&output.stdout))
}

pub async fn list_directory<S: RemoteShell + ?Sized>(
    shell: &mut S,
    path: &str,
) -> Result<Vec<RemoteDirEntry>> {
    let output = run(shell, &RemoteCommand::list_long(path)).await?;
    if output.stdout.trim() == MISSING_MARKER {
        return Err(HpcError::NotFound {
            path: path.to_string(),
            output: output.stderr,
        });
    }
    Ok(parse_long_listing(&output.stdout))
}

pub async fn home_dir<S: RemoteShell + ?Sized>(shell: &mut S) -> Result<String> {
    let output = run(shell, &RemoteCommand::home_dir()).await?;
    let mut home = output.stdout.trim().to_string();
    while home.ends_with('/') && home.len() > 1 {
        home.pop();
    }
    if home.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(home)
    }
}

/// Project directories directly under `base`, as paths without the trailing
/// slash.
pub async fn list_projects<S: RemoteShell + ?Sized>(
    shell: &mut S,
    base: &str,
) -> Result<Vec<String>> {
    let output = run(shell, &RemoteCommand::list_project_dirs(base)).await?;
    Ok(output
        .lines()
        .map(|line| {
            let trimmed = line.trim_end_matches('/');
            let path = if trimmed.is_empty() { "/" } else { trimmed };
            path.to_string()
        })
        .collect())
}

/// Names of the immediate subdirectories of `path`, sorted.
pub async fn list_subdirectories<S: RemoteShell + ?Sized>(
    shell: &mut S,
    path: &str,
) -> Result<Vec<String>> {
    let output = run(shell, &RemoteCommand::list_subdirectories(path)).await?;
    let mut names: Vec<String> = output.lines().map(str::to_string).collect();
    names.sort();
    Ok(names)
}

/// Number of directories exactly `depth` levels below `path`. Missing paths
/// count as zero.
pub async fn count_subdirectories<S: RemoteShell + ?Sized>(
    shell: &mut S,
    path: &str,
    depth: u32,
) -> Result<usize> {
    let output = run(shell, &RemoteCommand::count_directories(path, depth)).await?;
    Ok(output.stdout.trim().parse().unwrap_or(0))
}

pub async fn list_files_recursive<S: RemoteShell + ?Sized>(
    shell: &mut S,
    path: &str,
) -> Result<Vec<String>> {
    let output = run(shell, &RemoteCommand::find_files(path)).await?;
    Ok(output.lines().map(str::to_string).collect())
}

pub async fn path_exists<S: RemoteShell + ?Sized>(shell: &mut S, path: &str) -> Result<bool> {
    let output = run(shell, &RemoteCommand::dir_exists(path)).await?;
    Ok(output.stdout.trim() == "EXISTS")
}

pub async fn make_directory<S: RemoteShell + ?Sized>(shell: &mut S, path: &str) -> Result<()> {
    let command = RemoteCommand::make_directory(path).confirmed();
    let output = run(shell, &command).await?;
    if !output.is_confirmed() {
        return Err(HpcError::RemoteExecution {
            command: command.to_string(),
            message: if output.stderr.is_empty() {
                "mkdir did not complete".to_string()
            } else {
                output.stderr
            },
        });
    }
    Ok(())
}

/// Reads a text file, falling back to its first `max_lines` lines when it is
/// larger than [`READ_FILE_LIMIT`].
pub async fn read_file<S: RemoteShell + ?Sized>(
    shell: &mut S,
    path: &str,
    max_lines: usize,
) -> Result<FileContent> {
    let size_output = run(shell, &RemoteCommand::file_size(path)).await?;
    let Ok(size) = size_output.stdout.trim().parse::<u64>() else {
        return Err(HpcError::NotFound {
            path: path.to_string(),
            output: size_output.stderr,
        });
    };
    let truncated = size > READ_FILE_LIMIT;
    let command = if truncated {
        RemoteCommand::head(path, max_lines)
    } else {
        RemoteCommand::cat(path)
    };
    let output = run(shell, &command).await?;
    Ok(FileContent {
        text: output.stdout,
        truncated,
    })
}
