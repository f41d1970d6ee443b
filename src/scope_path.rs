use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, IoResultExt, Result};

/// Make `path` absolute and fold `.`/`..` lexically, without touching the
/// filesystem beyond reading the working directory for relative input.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).at(path)?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root.
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

pub fn is_root(path: &Path) -> bool {
    path.parent().is_none()
}

/// True when `path` is `root` or lies beneath it. Both sides are compared
/// component-wise, so `/foo/barbaz` is not within `/foo/bar`.
pub fn is_within_scope(path: &Path, root: &Path) -> bool {
    if cfg!(windows) {
        let lower = |p: &Path| p.to_string_lossy().replace('\\', "/").to_ascii_lowercase();
        return Path::new(&lower(path)).starts_with(Path::new(&lower(root)));
    }
    path.starts_with(root)
}

/// Validate a single path segment supplied by the caller.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(FsError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name == "." || name == ".." {
        return invalid("name refers to a directory alias");
    }
    if name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR) {
        return invalid("name contains a path separator");
    }
    if name.contains('\0') {
        return invalid("name contains a NUL byte");
    }
    Ok(())
}
