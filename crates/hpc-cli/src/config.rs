use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use hpc_client::{ClientOptions, JobSpec, Resources, SshTarget, DEFAULT_OUTPUT_LOG};
use serde::Deserialize;
use system_utils::path::expand_tilde;

use crate::cli::{Args, JobArgs};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "config/hpc-jobs.toml";
const DEFAULT_KEY_PATH: &str = "~/.ssh/id_rsa";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub(crate) connection: ConnectionConfig,
    #[serde(default)]
    pub(crate) timeouts: TimeoutConfig,
    #[serde(default)]
    pub(crate) defaults: JobTemplate,
    pub(crate) project_root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConnectionConfig {
    pub(crate) host: Option<String>,
    pub(crate) user: Option<String>,
    pub(crate) key_path: Option<String>,
    pub(crate) port: Option<u16>,
    #[serde(default)]
    pub(crate) ssh_options: Vec<String>,
    pub(crate) control_dir: Option<String>,
}

/// Durations in humantime syntax, e.g. `10s` or `2m`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TimeoutConfig {
    pub(crate) connect: Option<String>,
    pub(crate) command: Option<String>,
    pub(crate) transfer: Option<String>,
}

/// A partially filled job. Used for `[defaults]`, template files and
/// command-line flags, layered in that order.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct JobTemplate {
    pub(crate) image: Option<String>,
    pub(crate) command: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) working_directory: Option<String>,
    pub(crate) cpus: Option<u32>,
    pub(crate) memory: Option<String>,
    pub(crate) gpus: Option<u32>,
    pub(crate) time_limit: Option<String>,
    pub(crate) output_log: Option<String>,
}

impl JobTemplate {
    pub(crate) fn from_args(args: &JobArgs) -> Self {
        Self {
            image: args.image.clone(),
            command: args.job_command.clone(),
            name: args.name.clone(),
            working_directory: args.workdir.clone(),
            cpus: args.cpus,
            memory: args.memory.clone(),
            gpus: args.gpus,
            time_limit: args.time.clone(),
            output_log: args.output_log.clone(),
        }
    }

    /// Values set in `other` win.
    pub(crate) fn overlay(self, other: JobTemplate) -> Self {
        Self {
            image: other.image.or(self.image),
            command: other.command.or(self.command),
            name: other.name.or(self.name),
            working_directory: other.working_directory.or(self.working_directory),
            cpus: other.cpus.or(self.cpus),
            memory: other.memory.or(self.memory),
            gpus: other.gpus.or(self.gpus),
            time_limit: other.time_limit.or(self.time_limit),
            output_log: other.output_log.or(self.output_log),
        }
    }

    pub(crate) fn into_spec(self) -> anyhow::Result<JobSpec> {
        let defaults = Resources::default();
        let spec = JobSpec {
            image: required(self.image, "image")?,
            command: required(self.command, "command")?,
            name: required(self.name, "name")?,
            working_directory: required(self.working_directory, "workdir")?,
            resources: Resources {
                cpus: self.cpus.unwrap_or(defaults.cpus),
                memory: self.memory.unwrap_or(defaults.memory),
                gpus: self.gpus.unwrap_or(defaults.gpus),
                time_limit: self.time_limit.unwrap_or(defaults.time_limit),
            },
            output_log: self
                .output_log
                .unwrap_or_else(|| DEFAULT_OUTPUT_LOG.to_string()),
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn required(value: Option<String>, field: &str) -> anyhow::Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("job {field} is required (flag --{field} or template field)"),
    }
}

pub(crate) fn load_job_template(path: &Path) -> anyhow::Result<JobTemplate> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job template {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse job template {}", path.display()))
}

/// Reads the config file. The default path is optional; an explicitly given
/// one must exist.
pub(crate) fn load_file_config(explicit: Option<&PathBuf>) -> anyhow::Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !path.exists() {
                return Ok(FileConfig::default());
            }
            path
        }
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: FileConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

pub(crate) fn resolve_target(args: &Args, config: &ConnectionConfig) -> anyhow::Result<SshTarget> {
    let host = args
        .host
        .clone()
        .or_else(|| config.host.clone())
        .filter(|host| !host.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("no host given; set --host or connection.host"))?;
    let user = args
        .user
        .clone()
        .or_else(|| config.user.clone())
        .or_else(|| std::env::var("USER").ok())
        .filter(|user| !user.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("no user given; set --user or connection.user"))?;
    let key = match (&args.key, &config.key_path) {
        (Some(key), _) => key.clone(),
        (None, Some(key)) => expand_tilde(key),
        (None, None) => expand_tilde(DEFAULT_KEY_PATH),
    };
    let mut target = SshTarget::new(host, user, key);
    target.port = args.port.or(config.port);
    target.ssh_options = config.ssh_options.clone();
    Ok(target)
}

pub(crate) fn resolve_options(file: &FileConfig) -> anyhow::Result<ClientOptions> {
    let defaults = ClientOptions::default();
    let timeouts = &file.timeouts;
    Ok(ClientOptions {
        connect_timeout: parse_timeout(
            "connect",
            timeouts.connect.as_deref(),
            defaults.connect_timeout,
        )?,
        command_timeout: parse_timeout(
            "command",
            timeouts.command.as_deref(),
            defaults.command_timeout,
        )?,
        transfer_timeout: parse_timeout(
            "transfer",
            timeouts.transfer.as_deref(),
            defaults.transfer_timeout,
        )?,
        control_dir: file
            .connection
            .control_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or(defaults.control_dir),
    })
}

fn parse_timeout(field: &str, value: Option<&str>, default: Duration) -> anyhow::Result<Duration> {
    let Some(value) = value else {
        return Ok(default);
    };
    let duration = humantime::parse_duration(value)
        .with_context(|| format!("invalid timeouts.{field} {value:?}"))?;
    if duration.is_zero() {
        anyhow::bail!("timeouts.{field} must be greater than zero");
    }
    Ok(duration)
}
