pub fn join_remote_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

pub fn remote_parent_dir(path: &str) -> String {
    if let Some((parent, _)) = path.rsplit_once('/') {
        if parent.is_empty() {
            "/".to_string()
        } else {
            parent.to_string()
        }
    } else {
        ".".to_string()
    }
}

/// Lexically resolves `.` and `..` in an absolute remote path. Returns `None`
/// for relative paths.
pub fn normalize_remote_path(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

/// Whether `path` stays inside `root` once `..` segments are resolved.
/// The core never sandboxes paths; front ends call this before handing a
/// user-supplied path to a transfer or listing.
pub fn is_within_root(root: &str, path: &str) -> bool {
    let (Some(root), Some(path)) = (normalize_remote_path(root), normalize_remote_path(path))
    else {
        return false;
    };
    if root == "/" {
        return true;
    }
    path == root || path.starts_with(&format!("{root}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_slashes() {
        assert_eq!(join_remote_path("/", "etc"), "/etc");
        assert_eq!(join_remote_path("/home/a/", "job.sh"), "/home/a/job.sh");
        assert_eq!(join_remote_path("/home/a", "job.sh"), "/home/a/job.sh");
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(remote_parent_dir("/job.sh"), "/");
        assert_eq!(remote_parent_dir("/home/a/job.sh"), "/home/a");
        assert_eq!(remote_parent_dir("job.sh"), ".");
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(
            normalize_remote_path("/home/a/./projects/../out/").as_deref(),
            Some("/home/a/out")
        );
        assert_eq!(normalize_remote_path("/../..").as_deref(), Some("/"));
        assert!(normalize_remote_path("relative/path").is_none());
    }

    #[test]
    fn root_guard_rejects_escapes() {
        let root = "/home/a/projects";
        assert!(is_within_root(root, "/home/a/projects"));
        assert!(is_within_root(root, "/home/a/projects/demo/out.zip"));
        assert!(!is_within_root(root, "/home/a/projects/../.ssh/id_rsa"));
        assert!(!is_within_root(root, "/home/a/projects-old/file"));
        assert!(!is_within_root(root, "projects/demo"));
    }
}
