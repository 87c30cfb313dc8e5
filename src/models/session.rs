//! Persisted session metadata.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workspace::normalize_relative_dir;
use crate::{AppError, Result};

/// Repository facts recorded when a session's workspace came from a clone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    /// Clone URL as requested (never carries an injected token).
    pub url: String,
    /// Branch the clone resolved to.
    pub branch: String,
    /// Generated working branch, if one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    /// Clone directory relative to the session root.
    pub cloned_path: String,
}

/// Session record; one per session id, overwritten whole on every change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Session identifier; immutable once assigned.
    pub session_id: String,
    /// Human-readable session name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    /// The execution capability's own session handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_correlation_id: Option<String>,
    /// Provider the session was created with.
    pub provider: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Repository facts, when the workspace came from a clone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    /// Sequence number the next job on this session starts from.
    #[serde(default)]
    pub next_sequence: u64,
}

impl SessionMetadata {
    /// Default record for a freshly created session.
    #[must_use]
    pub fn new(session_id: String, provider: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            session_name: None,
            external_correlation_id: None,
            provider,
            created_at: now,
            updated_at: now,
            repository: None,
            next_sequence: 0,
        }
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Workspace path under `session_root`: the clone directory when one
    /// was recorded, the root itself otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WorkspaceRecoveryFailed` when the recorded clone
    /// path is absolute or escapes the session root.
    pub fn workspace_path(&self, session_root: &Path) -> Result<PathBuf> {
        match self.repository {
            Some(ref repo) => {
                let cloned = normalize_relative_dir(&repo.cloned_path).map_err(|err| {
                    AppError::WorkspaceRecoveryFailed(format!(
                        "stored clone path is unusable: {err}"
                    ))
                })?;
                Ok(session_root.join(cloned))
            }
            None => Ok(session_root.to_path_buf()),
        }
    }
}
