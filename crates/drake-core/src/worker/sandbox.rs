//! Pure path-resolution logic for the worker's filesystem tools: deny paths
//! that escape the workspace directory unless they fall under an explicitly
//! allowed external path.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("path {0:?} escapes the workspace and is not in an allowed external path")]
    PathEscapesWorkspace(String),
}

/// Resolves `requested` (which may be relative or absolute) against
/// `workspace_root`, rejecting any result outside `workspace_root` unless it
/// falls under one of `allowed_external_paths`.
pub fn resolve_path(
    workspace_root: &Path,
    requested: &str,
    allowed_external_paths: &[PathBuf],
) -> Result<PathBuf, SandboxError> {
    let joined = if Path::new(requested).is_absolute() {
        PathBuf::from(requested)
    } else {
        workspace_root.join(requested)
    };
    let normalized = normalize(&joined);

    if is_within(&normalized, workspace_root) {
        return Ok(normalized);
    }
    if allowed_external_paths
        .iter()
        .any(|allowed| is_within(&normalized, allowed))
    {
        return Ok(normalized);
    }
    Err(SandboxError::PathEscapesWorkspace(requested.to_string()))
}

/// Lexically collapses `.` and `..` components without touching the
/// filesystem (the path may not exist yet, e.g. a file to be created).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_within(path: &Path, root: &Path) -> bool {
    let root = normalize(root);
    path.starts_with(&root)
}
