use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

/// Exit status `ssh` reserves for its own failures; any other status belongs
/// to the remote command.
pub const SSH_FAILURE_STATUS: i32 = 255;

pub fn apply_ssh_options(cmd: &mut Command, connect_timeout: Duration) {
    cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
    cmd.arg("-o")
        .arg(format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)));
    cmd.arg("-o").arg("BatchMode=yes");
    cmd.arg("-o").arg("LogLevel=ERROR");
}

/// Points `cmd` at an already running control master instead of opening a
/// fresh connection.
pub fn apply_control_options(cmd: &mut Command, control_path: &Path) {
    cmd.arg("-o")
        .arg(format!("ControlPath={}", control_path.display()));
    cmd.arg("-o").arg("ControlMaster=no");
}

pub fn control_path_for(control_dir: &Path, name: &str) -> PathBuf {
    let hash = hash_name(name);
    control_dir.join(format!("{hash:016x}.sock"))
}

fn hash_name(name: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

pub fn format_ssh_failure(label: &str, stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let detail = format!("{}{}", stdout, stderr).trim().to_string();
    let mut message = if detail.is_empty() {
        format!("{label} failed")
    } else {
        format!("{label} failed: {detail}")
    };
    if let Some(hint) = ssh_auth_hint(&detail) {
        message.push('\n');
        message.push_str(hint);
    }
    message
}

fn ssh_auth_hint(detail: &str) -> Option<&'static str> {
    let detail = detail.to_lowercase();
    if detail.contains("keyboard-interactive")
        || detail.contains("verification code")
        || detail.contains("two-factor")
    {
        return Some(
            "ssh requires keyboard-interactive/2FA, which batch mode cannot answer. \
             Open a session manually first or use key-only auth.",
        );
    }
    if detail.contains("permission denied")
        || detail.contains("authentication failed")
        || detail.contains("no supported authentication methods available")
        || detail.contains("too many authentication failures")
    {
        return Some(
            "ssh key authentication failed. Check the key path and that its public key \
             is in the remote authorized_keys.",
        );
    }
    if detail.contains("identity file") && detail.contains("not accessible") {
        return Some("ssh could not read the identity file.");
    }
    None
}
