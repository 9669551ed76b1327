//! The fixed vocabulary of remote shell commands.
//!
//! Every path, name or other interpolated value goes through
//! [`shell_escape`]; the only unescaped text is the command skeleton itself
//! and values that are validated to be safe (job ids, line counts).

use std::fmt;

use crate::paths::remote_parent_dir;
use crate::types::JobId;

/// Printed by [`RemoteCommand::list_long`] when the directory is missing.
pub(crate) const MISSING_MARKER: &str = "__hpc_jobs_missing__";
/// Printed by [`RemoteCommand::confirmed`] commands once every step succeeded.
pub(crate) const DONE_MARKER: &str = "__hpc_jobs_done__";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCommand(String);

impl RemoteCommand {
    /// Wraps a caller-built command line as-is. Quoting is the caller's job.
    pub fn raw(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a marker that is printed only if everything before it
    /// succeeded. The runner ignores exit codes, so this is how callers learn
    /// that a side-effecting command worked.
    pub fn confirmed(self) -> Self {
        Self(format!(
            "{{ {}; }} && printf '%s\\n' {}",
            self.0, DONE_MARKER
        ))
    }

    pub fn home_dir() -> Self {
        Self("printf %s \"$HOME\"".to_string())
    }

    /// `-H` makes `ls` list the target when `path` itself is a symlink.
    pub fn list_long(path: &str) -> Self {
        let path = shell_escape(path);
        Self(format!(
            "if test -d {path}; then LC_ALL=C ls -lhAH -- {path}; \
             else printf '%s\\n' {MISSING_MARKER}; fi"
        ))
    }

    /// Subdirectories of `base`, one per line with a trailing `/`.
    pub fn list_project_dirs(base: &str) -> Self {
        Self(format!("ls -d -- {}/*/ 2>/dev/null", shell_escape(base)))
    }

    pub fn list_subdirectories(path: &str) -> Self {
        Self(format!(
            "find {} -maxdepth 1 -mindepth 1 -type d -exec basename {{}} \\; 2>/dev/null",
            shell_escape(path)
        ))
    }

    pub fn count_directories(path: &str, depth: u32) -> Self {
        Self(format!(
            "find {} -maxdepth {depth} -mindepth {depth} -type d 2>/dev/null | wc -l",
            shell_escape(path)
        ))
    }

    pub fn find_files(path: &str) -> Self {
        Self(format!("find {} -type f 2>/dev/null", shell_escape(path)))
    }

    pub fn dir_exists(path: &str) -> Self {
        Self(format!(
            "test -d {} && echo EXISTS || echo 'NOT FOUND'",
            shell_escape(path)
        ))
    }

    pub fn make_directory(path: &str) -> Self {
        Self(format!("mkdir -p -- {}", shell_escape(path)))
    }

    pub fn file_size(path: &str) -> Self {
        let path = shell_escape(path);
        Self(format!(
            "stat -c%s -- {path} 2>/dev/null || stat -f%z -- {path} 2>/dev/null"
        ))
    }

    pub fn cat(path: &str) -> Self {
        Self(format!("cat -- {}", shell_escape(path)))
    }

    pub fn head(path: &str, lines: usize) -> Self {
        Self(format!("head -n {lines} -- {}", shell_escape(path)))
    }

    /// Writes stdin to `path`, creating the parent directory first.
    pub fn write_file(path: &str) -> Self {
        Self(format!(
            "mkdir -p -- {} && cat > {}",
            shell_escape(&remote_parent_dir(path)),
            shell_escape(path)
        ))
    }

    pub fn submit(script_path: &str, job_name: Option<&str>) -> Self {
        match job_name {
            Some(name) => Self(format!(
                "sbatch --job-name={} {}",
                shell_escape(name),
                shell_escape(script_path)
            )),
            None => Self(format!("sbatch {}", shell_escape(script_path))),
        }
    }

    pub fn job_state(job_id: &JobId) -> Self {
        Self(format!("squeue -j {job_id} -h -o '%T'"))
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn shell_escape(value: &str) -> String {
    let mut escaped = String::from("'");
    for ch in value.chars() {
        if ch == '\'' {
            escaped.push_str("'\"'\"'");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}
