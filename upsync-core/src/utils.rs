use std::path::{Component, Path};

/// Render a relative local path with `/` separators, dropping `.` components.
pub fn as_posix_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Join the remote root with a path relative to the local root.
pub fn remote_path(remote_root: &str, rel: &Path) -> String {
    let rel = as_posix_path(rel);
    if rel.is_empty() {
        remote_root.to_string()
    } else if remote_root.ends_with('/') {
        format!("{remote_root}{rel}")
    } else {
        format!("{remote_root}/{rel}")
    }
}

/// Parent directory of a remote POSIX path, if it has a non-root one.
pub fn remote_parent(path: &str) -> Option<&str> {
    let idx = path.trim_end_matches('/').rfind('/')?;
    if idx == 0 {
        return None;
    }
    Some(&path[..idx])
}
