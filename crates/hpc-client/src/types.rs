use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_OUTPUT_LOG: &str = "slurm-%j.out";

/// Resource request written into the batch script header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Resources {
    pub cpus: u32,
    pub memory: String,
    pub gpus: u32,
    pub time_limit: String,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpus: 2,
            memory: "4G".to_string(),
            gpus: 0,
            time_limit: "01:00:00".to_string(),
        }
    }
}

/// A containerized batch job. Values are written into the script as given,
/// so call [`JobSpec::validate`] before submitting anything built from
/// untrusted input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Container image (or script) the command runs in.
    pub image: String,
    /// Inline shell command executed inside the container.
    pub command: String,
    pub name: String,
    pub working_directory: String,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default = "default_output_log")]
    pub output_log: String,
}

fn default_output_log() -> String {
    DEFAULT_OUTPUT_LOG.to_string()
}

/// Scheduler-assigned job identifier. Always a non-empty run of ASCII digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid job id: {value:?}"))
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: JobId,
    /// Where the rendered script was uploaded; only set for templated
    /// submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_script: Option<String>,
}

/// Job state as reported by `squeue`. The set is open: unknown tokens are
/// kept verbatim in [`JobStatus::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl JobStatus {
    /// Interprets the output of `squeue -h -o '%T'`.
    ///
    /// Empty output means the scheduler no longer knows the job, which is
    /// read as `Completed`. That also covers jobs that failed and were purged
    /// from the queue, so callers that care must check the job's output.
    pub fn from_query_output(stdout: &str) -> Self {
        match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(token) => Self::from(token.to_string()),
            None => Self::Completed,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.trim() {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoteDirEntry {
    pub name: String,
    /// Size as `ls -h` printed it, e.g. `842K`.
    pub size: String,
    pub modified: String,
    pub is_directory: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileContent {
    pub text: String,
    /// Set when only the first lines of a large file were read.
    pub truncated: bool,
}
