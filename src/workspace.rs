//! Local workspace layout and path safety.
//!
//! Every session owns one directory under the configured workspace root,
//! named deterministically from its id. Repository clone directories are
//! kept strictly inside that session root.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Directory name of a session's root under the workspace root.
#[must_use]
pub fn session_dir_name(session_id: &str) -> String {
    format!("session-{session_id}")
}

/// Absolute path of a session's root directory.
#[must_use]
pub fn session_root(workspace_root: &Path, session_id: &str) -> PathBuf {
    workspace_root.join(session_dir_name(session_id))
}

/// Validate a caller-supplied session id.
///
/// Ids are opaque, but they become directory and file names, so only
/// ASCII alphanumerics, `-` and `_` are accepted.
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` for empty or unsafe ids.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(AppError::InvalidRequest("session id must not be empty".into()));
    }
    if session_id.len() > 128 {
        return Err(AppError::InvalidRequest("session id is too long".into()));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::InvalidRequest(format!(
            "session id '{session_id}' contains unsupported characters"
        )));
    }
    Ok(())
}

/// Normalize a relative directory that must stay inside the session root.
///
/// Collapses `.` segments and resolves `..` against earlier segments.
/// Returns the normalized path with `/` separators.
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` if the path is absolute, empty after
/// normalization, or escapes the session root.
pub fn normalize_relative_dir(candidate: &str) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(candidate).components() {
        match component {
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(AppError::InvalidRequest(format!(
                        "directory '{candidate}' escapes the session root"
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::InvalidRequest(format!(
                    "directory '{candidate}' must be relative"
                )));
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    if parts.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "directory '{candidate}' resolves to the session root"
        )));
    }

    Ok(parts.join("/"))
}

/// Clone directory derived from a repository URL (`…/name.git` → `name`).
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` if no usable name can be derived.
pub fn repo_dir_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");

    if last.is_empty() || last == "." || last == ".." {
        return Err(AppError::InvalidRequest(format!(
            "cannot derive a directory name from repository url '{url}'"
        )));
    }

    normalize_relative_dir(last)
}
