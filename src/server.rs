//! HTTP front door.
//!
//! - `POST /jobs` runs one job and streams its events as Server-Sent Events.
//! - `GET /health` reports `idle`, `busy` or `finished`.
//! - `GET /sessions` lists stored session ids.
//! - `DELETE /sessions/{id}` removes a stored session.
//!
//! A worker process accepts exactly one job. Once that job terminates the
//! shutdown token fires and the server drains its connections and exits.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::LiveTransport;
use crate::models::job::JobRequest;
use crate::orchestrator::{JobDeps, Orchestrator};
use crate::workspace::validate_session_id;
use crate::{AppError, Result};

const IDLE: u8 = 0;
const BUSY: u8 = 1;
const FINISHED: u8 = 2;

/// Worker availability as reported by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// No job has been submitted yet.
    Idle,
    /// The job is running.
    Busy,
    /// The job has terminated; the process is shutting down.
    Finished,
}

/// Single-use admission token: one job per process.
#[derive(Debug, Default)]
pub struct JobGate {
    state: AtomicU8,
}

impl JobGate {
    /// Fresh, idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate; `None` once any job has been admitted.
    pub fn try_acquire(self: &Arc<Self>) -> Option<JobPermit> {
        self.state
            .compare_exchange(IDLE, BUSY, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| JobPermit {
                gate: Arc::clone(self),
            })
    }

    /// Current availability.
    #[must_use]
    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::SeqCst) {
            IDLE => GateState::Idle,
            BUSY => GateState::Busy,
            _ => GateState::Finished,
        }
    }
}

/// Held for the duration of the admitted job; marks the gate finished on drop.
#[derive(Debug)]
pub struct JobPermit {
    gate: Arc<JobGate>,
}

impl Drop for JobPermit {
    fn drop(&mut self) {
        self.gate.state.store(FINISHED, Ordering::SeqCst);
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
    deps: JobDeps,
    gate: Arc<JobGate>,
    shutdown: CancellationToken,
}

impl ServerState {
    /// State for a worker that shuts down through `shutdown` after its job.
    #[must_use]
    pub fn new(deps: JobDeps, shutdown: CancellationToken) -> Self {
        Self {
            deps,
            gate: Arc::new(JobGate::new()),
            shutdown,
        }
    }

    /// The worker's job gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<JobGate> {
        &self.gate
    }
}

/// JSON error body with a status derived from the error kind.
struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "code": self.0.code(), "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

/// Build the worker's router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(submit_job))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(delete_session))
        .with_state(state)
}

async fn health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({ "status": state.gate.state() }))
}

async fn submit_job(
    State(state): State<ServerState>,
    Json(request): Json<JobRequest>,
) -> Response {
    let Some(permit) = state.gate.try_acquire() else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "worker has already accepted a job" })),
        )
            .into_response();
    };

    let (transport, rx) = LiveTransport::channel();
    let deps = state.deps.clone();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        let mut orchestrator = Orchestrator::new(deps);
        match orchestrator.run(request, transport).await {
            Ok(session_id) => info!(session_id, "job finished"),
            Err(err) => debug!(%err, "job ended with error"),
        }
        drop(permit);
        shutdown.cancel();
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let envelope = rx.recv().await?;
        let event = SseEvent::default()
            .event(envelope.event.kind())
            .json_data(&envelope)
            .unwrap_or_else(|err| {
                warn!(%err, "failed to encode event for stream");
                SseEvent::default().comment("encoding error")
            });
        Some((Ok::<_, Infallible>(event), rx))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn list_sessions(
    State(state): State<ServerState>,
) -> std::result::Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.deps.storage.list().await?))
}

async fn delete_session(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    validate_session_id(&id)?;
    state.deps.storage.delete(&id).await?;
    info!(session_id = %id, "stored session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Serve on `port` until `state`'s shutdown token fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the server
/// fails.
pub async fn serve(state: ServerState, port: u16) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], port));
    let shutdown = state.shutdown.clone();

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind http on {bind}: {err}")))?;
    info!(%bind, "worker accepting jobs");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("http server error: {err}")))?;

    info!("http server shut down");
    Ok(())
}
