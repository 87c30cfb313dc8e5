//! End-of-job persistence, reporting and cleanup. Runs for every job that
//! got past request validation.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn, Instrument};

use super::JobDeps;
use crate::events::EventSink;
use crate::models::event::{Event, JobStatus, StatusUpdate};
use crate::models::session::SessionMetadata;
use crate::Result;

/// Remote drain bound used when no `[remote_sink]` section is configured.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// What the pipeline managed to establish before finishing.
#[derive(Debug)]
pub struct FinalizeInput {
    /// Session id, once resolved.
    pub session_id: Option<String>,
    /// Session root, once resolved.
    pub session_root: Option<PathBuf>,
    /// Metadata, once resolved.
    pub metadata: Option<SessionMetadata>,
    /// Wall-clock start of the job.
    pub started_at: DateTime<Utc>,
    /// Monotonic start of the job.
    pub started: Instant,
}

/// Persist, report and clean up.
///
/// 1. Save metadata (including where event numbering resumes) and upload
///    the session root if it exists. On the success path a failure here
///    turns the job into a failure; on the failure path it is logged.
/// 2. Emit exactly one terminal event.
/// 3. Send the final remote status.
/// 4. Remove the session root.
/// 5. Drain outstanding remote writes.
///
/// Returns the job's final outcome.
///
/// # Errors
///
/// The pipeline's error, or the persistence error that replaced success.
pub async fn finalize(
    deps: &JobDeps,
    sink: &EventSink,
    input: FinalizeInput,
    outcome: Result<()>,
) -> Result<()> {
    let span = info_span!(
        "finalize",
        session_id = input.session_id.as_deref().unwrap_or_default(),
        failed = outcome.is_err()
    );
    async move {
        let mut outcome = outcome;
        // The terminal event below takes the current sequence.
        let next_sequence = sink.next_sequence().saturating_add(1);
        if let Err(err) = persist(deps, &input, next_sequence).await {
            if outcome.is_ok() {
                outcome = Err(err);
            } else {
                warn!(%err, "best-effort persistence failed");
            }
        }

        let duration_ms = u64::try_from(input.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (event, status, error_code) = match outcome {
            Ok(()) => (
                Event::Completed {
                    session_id: input.session_id.clone().unwrap_or_default(),
                    duration_ms,
                },
                JobStatus::Completed,
                None,
            ),
            Err(ref err) => (
                Event::Error {
                    code: err.code(),
                    message: err.to_string(),
                },
                JobStatus::Failed,
                Some(err.code()),
            ),
        };
        sink.emit(event);
        sink.update_status(StatusUpdate {
            status,
            session_id: input.session_id.clone(),
            started_at: input.started_at,
            finished_at: Some(Utc::now()),
            error_code,
        });

        if let Some(ref root) = input.session_root {
            remove_workspace(root).await;
        }

        if sink.has_remote() {
            let timeout = deps
                .config
                .remote_sink
                .as_ref()
                .map_or(DEFAULT_DRAIN_TIMEOUT, |c| {
                    Duration::from_secs(c.drain_timeout_seconds)
                });
            if let Some(report) = sink.drain(timeout).await {
                if !report.completed || report.failed > 0 {
                    warn!(
                        dispatched = report.dispatched,
                        failed = report.failed,
                        completed = report.completed,
                        "remote sink did not receive every write"
                    );
                }
            }
        }

        info!(duration_ms, ok = outcome.is_ok(), "job finalized");
        outcome
    }
    .instrument(span)
    .await
}

async fn persist(deps: &JobDeps, input: &FinalizeInput, next_sequence: u64) -> Result<()> {
    let Some(ref session_id) = input.session_id else {
        return Ok(());
    };

    if let Some(ref metadata) = input.metadata {
        let mut metadata = metadata.clone();
        metadata.next_sequence = next_sequence;
        metadata.touch();
        deps.metadata.save(&metadata).await?;
    }

    if let Some(ref root) = input.session_root {
        if tokio::fs::try_exists(root).await.unwrap_or(false) {
            deps.storage.upload(session_id, root).await?;
            debug!(root = %root.display(), "workspace uploaded");
        }
    }
    Ok(())
}

async fn remove_workspace(root: &std::path::Path) {
    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => debug!(root = %root.display(), "workspace removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(%err, root = %root.display(), "failed to remove workspace"),
    }
}

