//! Populate a new session's workspace from a repository.
//!
//! An access token is only ever part of the URL for the duration of a
//! remote operation; the working copy's `origin` is left at the URL the
//! request named.

use std::path::Path;

use tracing::{debug, info, info_span, warn, Instrument};

use super::session_resolver::ResolvedSession;
use super::JobDeps;
use crate::events::EventSink;
use crate::models::event::Event;
use crate::models::job::{RepositorySpec, Secret};
use crate::models::session::RepositoryInfo;
use crate::vcs::url::{authenticated_url, redact_credentials};
use crate::workspace::{normalize_relative_dir, repo_dir_from_url};
use crate::Result;

/// Materialize the workspace for `session`.
///
/// Resumed sessions are trusted as resolved. New sessions with a
/// repository spec get a clone (or fetch+pull when the target already holds
/// a working copy); the resolved repository facts are saved to metadata.
/// When `branch_name` is given, the branch is created and checked out if it
/// does not exist yet; failures there are logged and ignored.
///
/// # Errors
///
/// Clone/pull failures (`AppError::Auth`, `AppError::RepoNotFound`,
/// `AppError::Vcs`) and metadata save failures.
pub async fn materialize(
    deps: &JobDeps,
    repository: Option<&RepositorySpec>,
    branch_name: Option<&str>,
    session: &mut ResolvedSession,
    sink: &EventSink,
) -> Result<()> {
    if session.is_resuming {
        debug!(session_id = %session.session_id, "resumed workspace used as-is");
        return Ok(());
    }
    let Some(spec) = repository else {
        return Ok(());
    };

    let span = info_span!("materialize", session_id = %session.session_id);
    async move {
        let cloned_path = match spec.directory.as_deref() {
            Some(dir) => normalize_relative_dir(dir)?,
            None => repo_dir_from_url(&spec.url)?,
        };
        let target = session.session_root.join(&cloned_path);
        let token = spec.access_token.as_ref().map(Secret::expose);
        let url = authenticated_url(&spec.url, token, &deps.config.repository.token_hosts);

        let branch = if deps.vcs.is_repository(&target) {
            sink.emit(Event::RepositoryProgress {
                message: format!("Updating repository {}", redact_credentials(&spec.url)),
            });
            pull_through(deps, &target, &url, &spec.url, spec.branch.as_deref()).await?
        } else {
            sink.emit(Event::RepositoryProgress {
                message: format!("Cloning repository {}", redact_credentials(&spec.url)),
            });
            let branch = deps
                .vcs
                .clone_repo(&url, &target, spec.branch.as_deref())
                .await?;
            if url != spec.url {
                deps.vcs.set_remote_url(&target, &spec.url).await?;
            }
            branch
        };
        sink.emit(Event::RepositoryProgress {
            message: format!("Repository ready on branch {branch}"),
        });
        info!(branch = %branch, path = %cloned_path, "repository materialized");

        session.metadata.repository = Some(RepositoryInfo {
            url: spec.url.clone(),
            branch,
            branch_name: None,
            cloned_path,
        });
        session.workspace_path = target;

        if let Some(name) = branch_name {
            match create_working_branch(deps, session, name).await {
                Ok(true) => {
                    if let Some(ref mut repo) = session.metadata.repository {
                        repo.branch_name = Some(name.to_owned());
                    }
                    sink.emit(Event::BranchCreated {
                        branch: name.to_owned(),
                    });
                }
                Ok(false) => debug!(branch = name, "working branch already exists"),
                Err(err) => warn!(%err, branch = name, "working branch creation failed"),
            }
        }

        session.metadata.touch();
        deps.metadata.save(&session.metadata).await
    }
    .instrument(span)
    .await
}

/// Pull using `url`, leaving `origin` pointed at `clean_url` afterwards
/// whether or not the pull succeeded.
async fn pull_through(
    deps: &JobDeps,
    target: &Path,
    url: &str,
    clean_url: &str,
    branch: Option<&str>,
) -> Result<String> {
    if url == clean_url {
        return deps.vcs.pull(target, branch).await;
    }
    deps.vcs.set_remote_url(target, url).await?;
    let pulled = deps.vcs.pull(target, branch).await;
    let restored = deps.vcs.set_remote_url(target, clean_url).await;
    let branch = pulled?;
    restored?;
    Ok(branch)
}

/// Returns whether the branch was created.
async fn create_working_branch(
    deps: &JobDeps,
    session: &ResolvedSession,
    name: &str,
) -> Result<bool> {
    if deps.vcs.branch_exists(&session.workspace_path, name).await? {
        return Ok(false);
    }
    deps.vcs.create_branch(&session.workspace_path, name).await?;
    Ok(true)
}
