//! Version-control primitives used to materialize and commit workspaces.

pub mod git;
pub mod url;

use std::path::Path;

use futures_util::future::BoxFuture;

use crate::Result;

pub use git::GitCli;

/// Repository operations the pipeline depends on.
///
/// Remote-touching operations (`clone_repo`, `pull`) classify failures at
/// the point they happen: rejected credentials are `AppError::Auth`, an
/// unknown repository is `AppError::RepoNotFound`, anything else is
/// `AppError::Vcs`.
pub trait VersionControl: Send + Sync {
    /// Whether `path` is the top of a working copy.
    fn is_repository(&self, path: &Path) -> bool;

    /// Clone `url` into `target`, checking out `branch` when it exists on
    /// the remote and the remote default otherwise.
    ///
    /// Returns the branch that ended up checked out.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth`, `AppError::RepoNotFound` or `AppError::Vcs`.
    fn clone_repo<'a>(
        &'a self,
        url: &'a str,
        target: &'a Path,
        branch: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>>;

    /// Fetch and fast-forward the working copy at `path`, switching to
    /// `branch` first when given. Returns the checked-out branch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth`, `AppError::RepoNotFound` or `AppError::Vcs`.
    fn pull<'a>(&'a self, path: &'a Path, branch: Option<&'a str>)
        -> BoxFuture<'a, Result<String>>;

    /// Point the `origin` remote of the working copy at `url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vcs` if the remote cannot be updated.
    fn set_remote_url<'a>(&'a self, path: &'a Path, url: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Short status listing of uncommitted changes (empty when clean).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vcs` if the status cannot be read.
    fn status<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>>;

    /// Textual diff of uncommitted changes, including untracked file names.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vcs` if the diff cannot be produced.
    fn diff<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>>;

    /// Stage everything and commit it; returns the new commit hash.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vcs` if staging or committing fails.
    fn commit_all<'a>(&'a self, path: &'a Path, message: &'a str)
        -> BoxFuture<'a, Result<String>>;

    /// Whether a local branch called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vcs` if the lookup itself fails.
    fn branch_exists<'a>(&'a self, path: &'a Path, name: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Create branch `name` from the current head and check it out.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vcs` if the branch cannot be created.
    fn create_branch<'a>(&'a self, path: &'a Path, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Whether the working copy has uncommitted changes.
    ///
    /// # Errors
    ///
    /// Propagates [`VersionControl::status`] failures.
    fn has_changes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(!self.status(path).await?.trim().is_empty()) })
    }
}
