//! Job lifecycle and state machine.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::finalizer::{self, FinalizeInput};
use super::session_resolver::{self, ResolvedSession};
use super::{materializer, naming, post_process, JobDeps};
use crate::errors::ErrorCode;
use crate::events::{EventLog, EventSink, LiveTransport, RemoteDispatcher};
use crate::execution::{ExecutionAdapter, ExecutionContext};
use crate::models::event::{Event, EventEnvelope, JobStatus, StatusUpdate};
use crate::models::job::JobRequest;
use crate::workspace::session_root;
use crate::{AppError, Result};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Completed successfully.
    Ok,
    /// Failed with the given code.
    Error(ErrorCode),
}

/// Position of a job in its lifecycle.
///
/// `Init → ResolvingSession → MaterializingWorkspace → Executing →
/// PostProcessing → Finalizing → Terminated`. Any active state may jump
/// to `Finalizing` on error. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not started.
    Init,
    /// Resolving or resuming the session.
    ResolvingSession,
    /// Populating the workspace.
    MaterializingWorkspace,
    /// Running the agent.
    Executing,
    /// Auto-commit chain.
    PostProcessing,
    /// Persisting, reporting and cleaning up.
    Finalizing,
    /// Done.
    Terminated(Termination),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ResolvingSession => "resolving_session",
            Self::MaterializingWorkspace => "materializing_workspace",
            Self::Executing => "executing",
            Self::PostProcessing => "post_processing",
            Self::Finalizing => "finalizing",
            Self::Terminated(Termination::Ok) => "terminated_ok",
            Self::Terminated(Termination::Error(_)) => "terminated_error",
        };
        f.write_str(name)
    }
}

/// Runs exactly one job.
pub struct Orchestrator {
    deps: JobDeps,
    state: JobState,
    history: Vec<JobState>,
}

/// Facts accumulated while the pipeline runs, handed to the finalizer.
struct JobProgress {
    session: Option<ResolvedSession>,
    session_id: Option<String>,
}

impl Orchestrator {
    /// Orchestrator for one job against `deps`.
    #[must_use]
    pub fn new(deps: JobDeps) -> Self {
        Self {
            deps,
            state: JobState::Init,
            history: vec![JobState::Init],
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state entered so far, in order.
    #[must_use]
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    fn transition(&mut self, next: JobState) {
        if matches!(self.state, JobState::Terminated(_)) {
            warn!(from = %self.state, to = %next, "ignoring transition out of terminated state");
            return;
        }
        debug!(from = %self.state, to = %next, "job state transition");
        self.state = next;
        self.history.push(next);
    }

    /// Run `request` to completion, streaming events to `transport`.
    ///
    /// Returns the session id on success. Every outcome is also reported to
    /// the transport as exactly one terminal event. Requests that fail
    /// validation are rejected before any workspace or remote write exists
    /// and their error event goes to the transport only.
    ///
    /// # Errors
    ///
    /// The classified error that ended the job.
    pub async fn run(&mut self, request: JobRequest, transport: LiveTransport) -> Result<String> {
        if !matches!(self.state, JobState::Init) {
            return Err(AppError::Internal(
                "orchestrator has already run a job".into(),
            ));
        }

        if let Err(err) = session_resolver::validate_request(&request) {
            warn!(%err, "job request rejected");
            transport.send(EventEnvelope::now(Event::Error {
                code: err.code(),
                message: err.to_string(),
            }));
            self.transition(JobState::Terminated(Termination::Error(err.code())));
            return Err(err);
        }

        let span = info_span!(
            "job",
            provider = %request.provider,
            resume = request.resume_session_id.is_some(),
            repository = request.repository.is_some()
        );
        self.run_validated(request, transport).instrument(span).await
    }

    async fn run_validated(
        &mut self,
        request: JobRequest,
        transport: LiveTransport,
    ) -> Result<String> {
        let started = Instant::now();
        let started_at = Utc::now();

        let remote = match (request.status_sink.clone(), self.deps.remote_sink.clone()) {
            (Some(target), Some(remote_sink)) => Some(RemoteDispatcher::new(remote_sink, target)),
            (Some(target), None) => {
                warn!(sink_id = %target.id, "status sink requested but no remote sink configured");
                None
            }
            (None, _) => None,
        };
        let sink = EventSink::new(transport, remote);

        let mut progress = JobProgress {
            session: None,
            session_id: request.resume_session_id.clone(),
        };
        let outcome = self
            .pipeline(&request, &sink, &mut progress, started_at)
            .await;

        self.transition(JobState::Finalizing);
        let session_root_path = progress
            .session
            .as_ref()
            .map(|s| s.session_root.clone())
            .or_else(|| {
                progress
                    .session_id
                    .as_deref()
                    .map(|id| session_root(&self.deps.config.workspace_root, id))
            });
        let input = FinalizeInput {
            session_id: progress.session_id.clone(),
            session_root: session_root_path,
            metadata: progress.session.map(|s| s.metadata),
            started_at,
            started,
        };
        let result = finalizer::finalize(&self.deps, &sink, input, outcome).await;

        match result {
            Ok(()) => {
                self.transition(JobState::Terminated(Termination::Ok));
                info!(session_id = ?progress.session_id, "job completed");
                Ok(progress.session_id.unwrap_or_default())
            }
            Err(err) => {
                self.transition(JobState::Terminated(Termination::Error(err.code())));
                warn!(%err, code = %err.code(), "job failed");
                Err(err)
            }
        }
    }

    async fn pipeline(
        &mut self,
        request: &JobRequest,
        sink: &EventSink,
        progress: &mut JobProgress,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let deps = self.deps.clone();

        self.transition(JobState::ResolvingSession);
        // A resumed session's id is known up front, so recovery events land
        // in its log too.
        if let Some(ref id) = request.resume_session_id {
            attach_session_log(&deps, sink, id);
        }
        let resolved = session_resolver::resolve(&deps, request, sink).await?;
        progress.session_id = Some(resolved.session_id.clone());
        let session = progress.session.insert(resolved);
        if !session.is_resuming {
            attach_session_log(&deps, sink, &session.session_id);
        }
        sink.emit(Event::Connected {
            session_id: session.session_id.clone(),
            resuming: session.is_resuming,
        });
        sink.update_status(StatusUpdate {
            status: JobStatus::Running,
            session_id: Some(session.session_id.clone()),
            started_at,
            finished_at: None,
            error_code: None,
        });

        let mut branch_name = None;
        if !session.is_resuming {
            let name =
                naming::generate_session_name(deps.summarizer.as_deref(), &request.user_request)
                    .await;
            session.metadata.session_name = Some(name.clone());
            session.metadata.touch();
            sink.emit(Event::SessionNamed { name: name.clone() });
            if request.repository.is_some() {
                branch_name = Some(naming::branch_name(
                    &deps.config.repository.branch_prefix,
                    &name,
                    &session.session_id,
                ));
            }
        }

        self.transition(JobState::MaterializingWorkspace);
        sink.emit(Event::progress("Preparing workspace"));
        materializer::materialize(
            &deps,
            request.repository.as_ref(),
            branch_name.as_deref(),
            session,
            sink,
        )
        .await?;

        self.transition(JobState::Executing);
        sink.emit(Event::progress("Running agent"));
        let ctx = ExecutionContext {
            session_id: session.session_id.clone(),
            provider: request.provider.clone(),
            credentials: request.credentials.clone(),
            workspace_path: session.workspace_path.clone(),
            external_correlation_id: session.metadata.external_correlation_id.clone(),
            options: request.options.clone(),
        };
        let adapter =
            ExecutionAdapter::new(Arc::clone(&deps.execution), deps.config.agent.timeout());
        adapter
            .run(
                &request.user_request,
                &ctx,
                sink,
                &mut session.metadata,
                deps.metadata.as_ref(),
            )
            .await?;

        let repository_used = session.metadata.repository.is_some();
        if post_process::should_run(repository_used, request.auto_commit_requested()) {
            self.transition(JobState::PostProcessing);
            post_process::auto_commit(
                deps.vcs.as_ref(),
                deps.summarizer.as_deref(),
                &deps.config.commit,
                &session.workspace_path,
                sink,
            )
            .await;
        }

        Ok(())
    }
}

fn attach_session_log(deps: &JobDeps, sink: &EventSink, session_id: &str) {
    match EventLog::open(&deps.config.log_dir(), session_id) {
        Ok(log) => {
            debug!(path = %log.path().display(), "event log attached");
            sink.attach_log(log);
        }
        Err(err) => warn!(%err, "event log unavailable"),
    }
}
