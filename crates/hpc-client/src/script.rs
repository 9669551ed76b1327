//! Slurm batch script rendering.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::command::shell_escape;
use crate::error::{HpcError, Result};
use crate::paths::join_remote_path;
use crate::types::JobSpec;

const CONTAINER_RUNTIME: &str = "apptainer";

/// Renders the batch script for `spec`. Pure: equal specs give
/// byte-identical scripts. The GPU request, when present, always sits right
/// after the wall-time directive.
pub fn render(spec: &JobSpec) -> String {
    let resources = &spec.resources;
    let mut script = String::from("#!/bin/bash\n");
    let _ = writeln!(script, "#SBATCH --job-name={}", spec.name);
    let _ = writeln!(script, "#SBATCH --output={}", spec.output_log);
    let _ = writeln!(script, "#SBATCH --cpus-per-task={}", resources.cpus);
    let _ = writeln!(script, "#SBATCH --mem={}", resources.memory);
    let _ = writeln!(script, "#SBATCH --time={}", resources.time_limit);
    if resources.gpus > 0 {
        let _ = writeln!(script, "#SBATCH --gres=gpu:{}", resources.gpus);
    }
    script.push('\n');
    let _ = writeln!(script, "cd {}", shell_escape(&spec.working_directory));
    script.push('\n');
    script.push_str("echo \"Running Apptainer job on $(hostname)\"\n");
    let _ = writeln!(
        script,
        "{CONTAINER_RUNTIME} exec {} {}",
        shell_escape(&spec.image),
        spec.command
    );
    script.push('\n');
    script.push_str("echo \"Job completed at $(date)\"\n");
    script
}

/// Remote location the rendered script is uploaded to.
pub fn script_path(spec: &JobSpec) -> String {
    join_remote_path(&spec.working_directory, &format!("{}.sh", spec.name))
}

impl JobSpec {
    /// Checks everything [`render`] writes unescaped. Directive values must
    /// stay on one line, otherwise they could smuggle in extra directives or
    /// commands.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(HpcError::InvalidJobSpec(message));
        if self.name.is_empty()
            || self
                .name
                .chars()
                .any(|ch| ch == '/' || ch.is_whitespace() || ch.is_control())
        {
            return invalid(format!(
                "job name {:?} must be non-empty without '/' or whitespace",
                self.name
            ));
        }
        for (field, value) in [
            ("image", &self.image),
            ("command", &self.command),
            ("working_directory", &self.working_directory),
            ("output_log", &self.output_log),
        ] {
            if value.trim().is_empty() {
                return invalid(format!("{field} must not be empty"));
            }
            if value.contains(['\n', '\r']) {
                return invalid(format!("{field} must be a single line"));
            }
        }
        let resources = &self.resources;
        if resources.cpus == 0 {
            return invalid("cpus must be at least 1".to_string());
        }
        if !memory_pattern().is_match(&resources.memory) {
            return invalid(format!(
                "memory {:?} must look like 16G, 512M or 4000",
                resources.memory
            ));
        }
        if !time_pattern().is_match(&resources.time_limit) {
            return invalid(format!(
                "time limit {:?} must be HH:MM:SS or D-HH:MM:SS",
                resources.time_limit
            ));
        }
        Ok(())
    }
}

fn memory_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+[KMGT]?$").expect("memory regex"))
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9]+-)?[0-9]{1,2}:[0-5][0-9]:[0-5][0-9]$").expect("time regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resources;

    fn hello_world() -> JobSpec {
        JobSpec {
            image: "/containers/base.sif".to_string(),
            command: "echo hi".to_string(),
            name: "hello_world".to_string(),
            working_directory: "/home/alice/projects/remoteTest".to_string(),
            resources: Resources {
                cpus: 4,
                memory: "16G".to_string(),
                gpus: 0,
                time_limit: "04:00:00".to_string(),
            },
            output_log: "slurm-%j.out".to_string(),
        }
    }

    #[test]
    fn renders_hello_world_scenario() {
        let script = render(&hello_world());
        let expected = "#!/bin/bash\n\
#SBATCH --job-name=hello_world\n\
#SBATCH --output=slurm-%j.out\n\
#SBATCH --cpus-per-task=4\n\
#SBATCH --mem=16G\n\
#SBATCH --time=04:00:00\n\
\n\
cd '/home/alice/projects/remoteTest'\n\
\n\
echo \"Running Apptainer job on $(hostname)\"\n\
apptainer exec '/containers/base.sif' echo hi\n\
\n\
echo \"Job completed at $(date)\"\n";
        assert_eq!(script, expected);
        assert!(!script.contains("--gres"));
    }

    #[test]
    fn render_is_deterministic() {
        let spec = hello_world();
        assert_eq!(render(&spec), render(&spec.clone()));
    }

    #[test]
    fn gpu_directive_only_when_requested() {
        let mut spec = hello_world();
        spec.resources.gpus = 2;
        let script = render(&spec);
        let lines: Vec<&str> = script.lines().collect();
        let time = lines
            .iter()
            .position(|line| *line == "#SBATCH --time=04:00:00")
            .expect("time directive");
        assert_eq!(lines[time + 1], "#SBATCH --gres=gpu:2");
        assert_eq!(script.matches("--gres").count(), 1);

        spec.resources.gpus = 0;
        assert!(!render(&spec).contains("--gres"));
    }

    #[test]
    fn script_lands_in_working_directory() {
        assert_eq!(
            script_path(&hello_world()),
            "/home/alice/projects/remoteTest/hello_world.sh"
        );
    }

    #[test]
    fn validate_accepts_scenario() {
        assert!(hello_world().validate().is_ok());
        let mut spec = hello_world();
        spec.resources.time_limit = "2-00:00:00".to_string();
        spec.resources.memory = "4000".to_string();
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_directive_injection() {
        let mut spec = hello_world();
        spec.output_log = "out.log\n#SBATCH --partition=gpu".to_string();
        assert!(matches!(spec.validate(), Err(HpcError::InvalidJobSpec(_))));

        let mut spec = hello_world();
        spec.name = "hello world".to_string();
        assert!(spec.validate().is_err());

        let mut spec = hello_world();
        spec.name = "../escape".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_resources() {
        let mut spec = hello_world();
        spec.resources.cpus = 0;
        assert!(spec.validate().is_err());

        let mut spec = hello_world();
        spec.resources.memory = "16 GB".to_string();
        assert!(spec.validate().is_err());

        let mut spec = hello_world();
        spec.resources.time_limit = "4h".to_string();
        assert!(spec.validate().is_err());
    }
}
