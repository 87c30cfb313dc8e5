//! [`VersionControl`] backed by the `git` command-line client.

use std::path::Path;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use super::url::redact_credentials;
use super::VersionControl;
use crate::config::RepositoryConfig;
use crate::{AppError, Result};

/// Captured result of one git invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Shells out to `git` for every operation.
///
/// Interactive credential prompts are disabled so an unauthenticated clone
/// fails fast instead of hanging the job.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    author_name: String,
    author_email: String,
}

impl GitCli {
    /// Build a client from the `[repository]` configuration section.
    #[must_use]
    pub fn new(config: &RepositoryConfig) -> Self {
        Self {
            binary: config.git_binary.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    async fn output(&self, cwd: Option<&Path>, args: &[&str]) -> Result<GitOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let out = cmd
            .output()
            .await
            .map_err(|err| AppError::Vcs(format!("failed to run {}: {err}", self.binary)))?;

        Ok(GitOutput {
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    /// Run a local command that must succeed; returns trimmed stdout.
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let out = self.output(Some(cwd), args).await?;
        if !out.success {
            return Err(AppError::Vcs(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                redact_credentials(out.stderr.trim())
            )));
        }
        Ok(out.stdout.trim_end().to_owned())
    }

    /// Run a command that talks to a remote; failures are classified.
    async fn run_remote(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
        let out = self.output(cwd, args).await?;
        if !out.success {
            let op = args.first().copied().unwrap_or_default();
            return Err(classify_remote_failure(op, &out.stderr));
        }
        Ok(out.stdout.trim_end().to_owned())
    }

    async fn current_branch(&self, path: &Path) -> Result<String> {
        self.run(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn remote_has_branch(&self, url: &str, branch: &str) -> Result<bool> {
        let refs = self
            .run_remote(None, &["ls-remote", "--heads", url, branch])
            .await?;
        Ok(!refs.trim().is_empty())
    }
}

/// Map a failed remote operation onto the error taxonomy.
fn classify_remote_failure(op: &str, stderr: &str) -> AppError {
    let detail = redact_credentials(stderr.trim());
    let lower = stderr.to_ascii_lowercase();

    let auth_markers = [
        "authentication failed",
        "could not read username",
        "could not read password",
        "invalid username or password",
        "access denied",
        "permission denied",
        "the requested url returned error: 401",
        "the requested url returned error: 403",
    ];
    let missing_markers = [
        "repository not found",
        "does not appear to be a git repository",
        "the requested url returned error: 404",
        "project you were looking for could not be found",
    ];

    if auth_markers.iter().any(|m| lower.contains(m)) {
        AppError::Auth(format!("git {op} rejected credentials: {detail}"))
    } else if missing_markers.iter().any(|m| lower.contains(m)) {
        AppError::RepoNotFound(format!("git {op}: {detail}"))
    } else {
        AppError::Vcs(format!("git {op} failed: {detail}"))
    }
}

impl VersionControl for GitCli {
    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn clone_repo<'a>(
        &'a self,
        url: &'a str,
        target: &'a Path,
        branch: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        let span = info_span!("git_clone", url = %redact_credentials(url), target = %target.display());
        Box::pin(
            async move {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|err| {
                        AppError::Vcs(format!(
                            "failed to create clone parent {}: {err}",
                            parent.display()
                        ))
                    })?;
                }

                let branch = match branch {
                    Some(b) if self.remote_has_branch(url, b).await? => Some(b),
                    Some(b) => {
                        warn!(branch = b, "branch not found on remote, using default");
                        None
                    }
                    None => None,
                };

                let target_str = target.to_string_lossy();
                let mut args = vec!["clone"];
                if let Some(b) = branch {
                    args.extend(["--branch", b]);
                }
                args.extend(["--", url, &*target_str]);
                self.run_remote(None, &args).await?;

                let resolved = self.current_branch(target).await?;
                info!(branch = %resolved, "repository cloned");
                Ok(resolved)
            }
            .instrument(span),
        )
    }

    fn pull<'a>(
        &'a self,
        path: &'a Path,
        branch: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        let span = info_span!("git_pull", path = %path.display());
        Box::pin(
            async move {
                self.run_remote(Some(path), &["fetch", "--prune", "origin"])
                    .await?;

                if let Some(b) = branch {
                    let current = self.current_branch(path).await?;
                    if current != b {
                        if self.branch_exists(path, b).await? {
                            self.run(path, &["checkout", b]).await?;
                        } else {
                            let upstream = format!("origin/{b}");
                            self.run(path, &["checkout", "-b", b, "--track", &upstream])
                                .await?;
                        }
                        debug!(from = %current, to = b, "switched branch");
                    }
                }

                let current = self.current_branch(path).await?;
                self.run_remote(Some(path), &["pull", "--ff-only", "origin", &current])
                    .await?;
                info!(branch = %current, "repository updated");
                Ok(current)
            }
            .instrument(span),
        )
    }

    fn set_remote_url<'a>(&'a self, path: &'a Path, url: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.run(path, &["remote", "set-url", "origin", url]).await?;
            debug!(url = %redact_credentials(url), "origin remote updated");
            Ok(())
        })
    }

    fn status<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.run(path, &["status", "--porcelain=v1"]).await })
    }

    fn diff<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            // A repository without commits has no HEAD to diff against.
            let mut text = match self.run(path, &["diff", "HEAD"]).await {
                Ok(diff) => diff,
                Err(_) => self.run(path, &["diff"]).await?,
            };

            let untracked = self
                .run(path, &["ls-files", "--others", "--exclude-standard"])
                .await?;
            if !untracked.trim().is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str("Untracked files:\n");
                text.push_str(&untracked);
            }
            Ok(text)
        })
    }

    fn commit_all<'a>(
        &'a self,
        path: &'a Path,
        message: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.run(path, &["add", "-A"]).await?;
            let name = format!("user.name={}", self.author_name);
            let email = format!("user.email={}", self.author_email);
            self.run(
                path,
                &["-c", &name, "-c", &email, "commit", "--no-verify", "-m", message],
            )
            .await?;
            self.run(path, &["rev-parse", "HEAD"]).await
        })
    }

    fn branch_exists<'a>(&'a self, path: &'a Path, name: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let reference = format!("refs/heads/{name}");
            let out = self
                .output(Some(path), &["rev-parse", "--verify", "--quiet", &reference])
                .await?;
            Ok(out.success)
        })
    }

    fn create_branch<'a>(&'a self, path: &'a Path, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.run(path, &["checkout", "-b", name]).await?;
            Ok(())
        })
    }
}
