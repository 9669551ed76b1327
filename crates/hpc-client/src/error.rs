use thiserror::Error;

pub type Result<T, E = HpcError> = std::result::Result<T, E>;

/// Failures surfaced by the remote job client. Every variant keeps the
/// command or path involved plus whatever the remote side printed.
#[derive(Debug, Error)]
pub enum HpcError {
    /// Authentication or network failure, or use of a closed session.
    #[error("connection to {destination} failed: {message}")]
    Connection { destination: String, message: String },

    /// The transport failed while running a command. The remote command's
    /// own exit status is never reported here.
    #[error("remote command `{command}` failed: {message}")]
    RemoteExecution { command: String, message: String },

    /// The scheduler did not hand back a numeric job id.
    #[error("`{command}` did not return a job id ({})", describe_output(.stdout, .stderr))]
    Submission {
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("transfer of {path} failed: {message}")]
    Transfer { path: String, message: String },

    #[error("remote path not found: {path}")]
    NotFound { path: String, output: String },

    #[error("invalid job spec: {0}")]
    InvalidJobSpec(String),
}

impl HpcError {
    pub(crate) fn closed(destination: &str) -> Self {
        Self::Connection {
            destination: destination.to_string(),
            message: "session is closed".to_string(),
        }
    }

    pub(crate) fn transfer(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn describe_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => "no output".to_string(),
        (false, true) => format!("stdout: {stdout}"),
        (true, false) => format!("stderr: {stderr}"),
        (false, false) => format!("stdout: {stdout}; stderr: {stderr}"),
    }
}
