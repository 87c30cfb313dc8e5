//! Session identity: validation, new-vs-resume, and workspace recovery.

use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::JobDeps;
use crate::events::EventSink;
use crate::models::event::Event;
use crate::models::job::JobRequest;
use crate::models::session::SessionMetadata;
use crate::vcs::url::redact_credentials;
use crate::workspace::{
    normalize_relative_dir, repo_dir_from_url, session_root, validate_session_id,
};
use crate::{AppError, Result};

/// Outcome of session resolution.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    /// Session identifier.
    pub session_id: String,
    /// Whether an existing session was resumed.
    pub is_resuming: bool,
    /// Current metadata record.
    pub metadata: SessionMetadata,
    /// The session's root directory.
    pub session_root: PathBuf,
    /// Directory the agent works in.
    pub workspace_path: PathBuf,
    /// Whether the workspace had to be rebuilt from the repository.
    pub recovered: bool,
}

/// Check a request before any side effect.
///
/// # Errors
///
/// Returns `AppError::InvalidRequest` when the request text, provider or
/// credentials are missing, when both a repository and a resume id are
/// given, or when an id or repository directory is unsafe.
pub fn validate_request(request: &JobRequest) -> Result<()> {
    if request.user_request.trim().is_empty() {
        return Err(AppError::InvalidRequest("user request text is required".into()));
    }
    if request.provider.trim().is_empty() {
        return Err(AppError::InvalidRequest("provider is required".into()));
    }
    if request.credentials.is_blank() {
        return Err(AppError::InvalidRequest("provider credentials are required".into()));
    }
    if request.repository.is_some() && request.resume_session_id.is_some() {
        return Err(AppError::InvalidRequest(
            "a repository cannot be given when resuming a session".into(),
        ));
    }
    if let Some(ref id) = request.resume_session_id {
        validate_session_id(id)?;
    }
    if let Some(ref repo) = request.repository {
        if repo.url.trim().is_empty() {
            return Err(AppError::InvalidRequest("repository url is required".into()));
        }
        match repo.directory.as_deref() {
            Some(dir) => normalize_relative_dir(dir).map(drop)?,
            None => repo_dir_from_url(&repo.url).map(drop)?,
        }
    }
    if let Some(ref sink) = request.status_sink {
        if sink.id.trim().is_empty() {
            return Err(AppError::InvalidRequest("status sink id is required".into()));
        }
    }
    Ok(())
}

/// Resolve the session for an already-validated request.
///
/// New sessions get a fresh id, an empty session root and default
/// metadata. Resumed sessions are loaded from the metadata store, their
/// stored files are downloaded, and a missing repository workspace is
/// re-cloned from the recorded url and branch.
///
/// # Errors
///
/// - `AppError::SessionNotFound` when no metadata exists for the resume id.
/// - `AppError::WorkspaceRecoveryFailed` when the workspace is missing and
///   cannot be rebuilt.
/// - Storage or I/O errors otherwise.
pub async fn resolve(
    deps: &JobDeps,
    request: &JobRequest,
    sink: &EventSink,
) -> Result<ResolvedSession> {
    match request.resume_session_id {
        Some(ref id) => resume(deps, id, sink).await,
        None => create(deps, request).await,
    }
}

async fn create(deps: &JobDeps, request: &JobRequest) -> Result<ResolvedSession> {
    let session_id = Uuid::new_v4().to_string();
    let root = session_root(&deps.config.workspace_root, &session_id);
    tokio::fs::create_dir_all(&root).await.map_err(|err| {
        AppError::Io(format!(
            "failed to create workspace {}: {err}",
            root.display()
        ))
    })?;

    info!(session_id, root = %root.display(), "new session created");
    Ok(ResolvedSession {
        metadata: SessionMetadata::new(session_id.clone(), request.provider.clone()),
        session_id,
        is_resuming: false,
        workspace_path: root.clone(),
        session_root: root,
        recovered: false,
    })
}

async fn resume(deps: &JobDeps, session_id: &str, sink: &EventSink) -> Result<ResolvedSession> {
    let span = info_span!("resume_session", session_id);
    async move {
        let mut metadata = deps
            .metadata
            .load(session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(format!("no session with id '{session_id}'")))?;
        sink.resume_sequence(metadata.next_sequence);

        let root = session_root(&deps.config.workspace_root, session_id);
        let existed_locally = root.exists();
        tokio::fs::create_dir_all(&root).await.map_err(|err| {
            AppError::Io(format!(
                "failed to create workspace {}: {err}",
                root.display()
            ))
        })?;

        let downloaded = deps.storage.download(session_id, &root).await?;
        debug!(existed_locally, downloaded, "session files restored");

        let workspace_path = metadata.workspace_path(&root)?;

        let missing = match metadata.repository {
            Some(_) => !deps.vcs.is_repository(&workspace_path),
            None => !existed_locally && !downloaded,
        };

        let recovered = if missing {
            recover(deps, &mut metadata, &workspace_path, sink).await?;
            true
        } else {
            false
        };

        info!(recovered, "session resumed");
        Ok(ResolvedSession {
            session_id: session_id.to_owned(),
            is_resuming: true,
            metadata,
            session_root: root,
            workspace_path,
            recovered,
        })
    }
    .instrument(span)
    .await
}

/// Rebuild a missing workspace from the recorded repository.
async fn recover(
    deps: &JobDeps,
    metadata: &mut SessionMetadata,
    workspace_path: &Path,
    sink: &EventSink,
) -> Result<()> {
    let Some(ref mut repo) = metadata.repository else {
        return Err(AppError::WorkspaceRecoveryFailed(
            "workspace files are missing and the session has no repository to restore from"
                .into(),
        ));
    };

    warn!(path = %workspace_path.display(), "workspace missing; re-cloning repository");
    sink.emit(Event::RepositoryProgress {
        message: format!("Restoring repository {}", redact_credentials(&repo.url)),
    });

    if workspace_path.exists() {
        tokio::fs::remove_dir_all(workspace_path).await.map_err(|err| {
            AppError::WorkspaceRecoveryFailed(format!(
                "failed to clear partial workspace {}: {err}",
                workspace_path.display()
            ))
        })?;
    }

    let resolved = deps
        .vcs
        .clone_repo(&repo.url, workspace_path, Some(&repo.branch))
        .await
        .map_err(|err| AppError::WorkspaceRecoveryFailed(format!("re-clone failed: {err}")))?;

    if resolved != repo.branch {
        warn!(recorded = %repo.branch, resolved = %resolved, "recorded branch no longer exists");
        repo.branch.clone_from(&resolved);
    }

    if let Some(ref branch_name) = repo.branch_name {
        if *branch_name != resolved {
            restore_working_branch(deps, workspace_path, branch_name).await;
        }
    }

    metadata.touch();
    if let Err(err) = deps.metadata.save(metadata).await {
        warn!(%err, "failed to persist recovered repository info");
    }
    sink.emit(Event::RepositoryProgress {
        message: format!("Repository restored on branch {resolved}"),
    });
    Ok(())
}

/// Recreate the session's working branch after a re-clone; failures are logged.
async fn restore_working_branch(deps: &JobDeps, path: &Path, branch_name: &str) {
    let result = async {
        if !deps.vcs.branch_exists(path, branch_name).await? {
            deps.vcs.create_branch(path, branch_name).await?;
        }
        Ok::<(), AppError>(())
    }
    .await;
    if let Err(err) = result {
        warn!(%err, branch = branch_name, "could not restore working branch");
    }
}
