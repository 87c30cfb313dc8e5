//! Auto-commit stage chain.
//!
//! Never fails the job: every error ends the chain with a `completed`
//! commit-progress event that carries the error text.

use std::path::Path;

use tracing::{info, info_span, warn, Instrument};

use crate::config::CommitConfig;
use crate::events::EventSink;
use crate::models::event::{CommitStage, Event};
use crate::summarize::{commit_message_prompt, Summarizer};
use crate::vcs::VersionControl;
use crate::Result;

/// Whether the auto-commit chain applies to a job.
#[must_use]
pub fn should_run(repository_used: bool, auto_commit_requested: bool) -> bool {
    repository_used && auto_commit_requested
}

/// Commit any uncommitted changes in `workspace`.
///
/// Emits nothing when the working copy is clean. Otherwise emits
/// `analyzing`, `generating_message`, `committing` and `completed` (with
/// the commit hash) in that order. Returns the hash when a commit was made.
pub async fn auto_commit(
    vcs: &dyn VersionControl,
    summarizer: Option<&dyn Summarizer>,
    config: &CommitConfig,
    workspace: &Path,
    sink: &EventSink,
) -> Option<String> {
    let span = info_span!("auto_commit", workspace = %workspace.display());
    async move {
        match vcs.has_changes(workspace).await {
            Ok(false) => {
                info!("no changes to commit");
                return None;
            }
            Ok(true) => {}
            Err(err) => {
                report_failure(sink, "Could not inspect workspace changes", &err.to_string());
                return None;
            }
        }

        match commit_stages(vcs, summarizer, config, workspace, sink).await {
            Ok(hash) => {
                info!(commit = %hash, "changes committed");
                sink.emit(Event::CommitProgress {
                    stage: CommitStage::Completed,
                    message: "Changes committed".into(),
                    commit_hash: Some(hash.clone()),
                    error: None,
                });
                Some(hash)
            }
            Err(err) => {
                report_failure(sink, "Auto-commit failed", &err.to_string());
                None
            }
        }
    }
    .instrument(span)
    .await
}

async fn commit_stages(
    vcs: &dyn VersionControl,
    summarizer: Option<&dyn Summarizer>,
    config: &CommitConfig,
    workspace: &Path,
    sink: &EventSink,
) -> Result<String> {
    sink.emit(Event::commit(CommitStage::Analyzing, "Analyzing changes"));
    let status = vcs.status(workspace).await?;
    let diff = vcs.diff(workspace).await?;

    sink.emit(Event::commit(
        CommitStage::GeneratingMessage,
        "Generating commit message",
    ));
    let message = commit_message(summarizer, config, &status, &diff).await;

    sink.emit(Event::commit(CommitStage::Committing, "Committing changes"));
    vcs.commit_all(workspace, &message).await
}

async fn commit_message(
    summarizer: Option<&dyn Summarizer>,
    config: &CommitConfig,
    status: &str,
    diff: &str,
) -> String {
    let Some(summarizer) = summarizer else {
        return config.fallback_message.clone();
    };
    let prompt = commit_message_prompt(status, diff, config.max_diff_chars);
    match summarizer.generate(&prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
        Ok(_) => config.fallback_message.clone(),
        Err(err) => {
            warn!(%err, "commit message generation failed; using fallback");
            config.fallback_message.clone()
        }
    }
}

fn report_failure(sink: &EventSink, message: &str, error: &str) {
    warn!(error, "{message}");
    sink.emit(Event::CommitProgress {
        stage: CommitStage::Completed,
        message: message.to_owned(),
        commit_hash: None,
        error: Some(error.to_owned()),
    });
}
