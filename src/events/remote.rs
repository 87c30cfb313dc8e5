//! Remote durable event/status sink.
//!
//! Writes are dispatched as tracked background tasks so the pipeline
//! never waits on the network. Chunk writes run independently since they
//! are addressed by index. Status writes overwrite a single record, so one
//! writer task applies them strictly in dispatch order. Failures are
//! reported through a channel to a supervisor task that logs and counts
//! them. [`RemoteDispatcher::drain`] gives outstanding writes a bounded
//! chance to finish before exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{Client, Url};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::RemoteSinkConfig;
use crate::models::event::{EventChunk, StatusUpdate};
use crate::models::job::StatusSinkSpec;
use crate::{AppError, Result};

/// External system recording a job's events and status.
///
/// Chunk writes are addressed by index; implementations must treat a
/// repeated index as a no-op so retries and reordering are harmless.
pub trait RemoteSink: Send + Sync {
    /// Record one event at `chunk.index`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sink` if the write is rejected or fails.
    fn append_chunk<'a>(
        &'a self,
        target: &'a StatusSinkSpec,
        chunk: &'a EventChunk,
    ) -> BoxFuture<'a, Result<()>>;

    /// Overwrite the job's status record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sink` if the write is rejected or fails.
    fn update_status<'a>(
        &'a self,
        target: &'a StatusSinkSpec,
        update: &'a StatusUpdate,
    ) -> BoxFuture<'a, Result<()>>;
}

/// HTTP implementation of [`RemoteSink`].
///
/// - `PUT {base}/sinks/{id}/chunks/{index}` with the chunk as JSON.
/// - `PUT {base}/sinks/{id}/status` with the status update as JSON.
///
/// Both carry the sink token as a bearer credential.
#[derive(Debug, Clone)]
pub struct HttpRemoteSink {
    client: Client,
    base_url: Url,
}

impl HttpRemoteSink {
    /// Build a sink client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the base URL is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &RemoteSinkConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| AppError::Config(format!("invalid remote_sink.base_url: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::Sink("remote sink base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl RemoteSink for HttpRemoteSink {
    fn append_chunk<'a>(
        &'a self,
        target: &'a StatusSinkSpec,
        chunk: &'a EventChunk,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let index = chunk.index.to_string();
            let url = self.endpoint(&["sinks", &target.id, "chunks", &index])?;
            self.client
                .put(url)
                .bearer_auth(target.token.expose())
                .json(chunk)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }

    fn update_status<'a>(
        &'a self,
        target: &'a StatusSinkSpec,
        update: &'a StatusUpdate,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["sinks", &target.id, "status"])?;
            self.client
                .put(url)
                .bearer_auth(target.token.expose())
                .json(update)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }
}

/// A failed remote write, reported to the supervisor.
#[derive(Debug)]
struct SinkFailure {
    what: String,
    error: AppError,
}

/// Outcome of [`RemoteDispatcher::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Writes dispatched over the dispatcher's lifetime.
    pub dispatched: u64,
    /// Writes that reported failure.
    pub failed: u64,
    /// Whether every write finished before the deadline.
    pub completed: bool,
}

/// Fire-and-forget dispatcher bound to one sink target.
pub struct RemoteDispatcher {
    sink: Arc<dyn RemoteSink>,
    target: StatusSinkSpec,
    tracker: TaskTracker,
    status_tx: Mutex<Option<mpsc::UnboundedSender<StatusUpdate>>>,
    failure_tx: Mutex<Option<mpsc::UnboundedSender<SinkFailure>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    dispatched: AtomicU64,
    failed: Arc<AtomicU64>,
}

impl RemoteDispatcher {
    /// Create a dispatcher and start its status writer and failure supervisor.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(sink: Arc<dyn RemoteSink>, target: StatusSinkSpec) -> Self {
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<SinkFailure>();
        let failed = Arc::new(AtomicU64::new(0));
        let failed_counter = Arc::clone(&failed);
        let sink_id = target.id.clone();

        let supervisor = tokio::spawn(async move {
            while let Some(failure) = failure_rx.recv().await {
                failed_counter.fetch_add(1, Ordering::SeqCst);
                warn!(
                    sink_id = %sink_id,
                    what = %failure.what,
                    error = %failure.error,
                    "remote sink write failed"
                );
            }
            debug!(sink_id = %sink_id, "remote sink supervisor exiting");
        });

        let tracker = TaskTracker::new();
        let (status_tx, status_rx) = mpsc::unbounded_channel::<StatusUpdate>();
        tracker.spawn(write_statuses(
            Arc::clone(&sink),
            target.clone(),
            status_rx,
            failure_tx.clone(),
        ));

        Self {
            sink,
            target,
            tracker,
            status_tx: Mutex::new(Some(status_tx)),
            failure_tx: Mutex::new(Some(failure_tx)),
            supervisor: Mutex::new(Some(supervisor)),
            dispatched: AtomicU64::new(0),
            failed,
        }
    }

    /// Dispatch an event chunk without waiting for it.
    pub fn dispatch_chunk(&self, chunk: EventChunk) {
        let sink = Arc::clone(&self.sink);
        let target = self.target.clone();
        let what = format!("chunk {}", chunk.index);
        self.spawn_write(what, async move { sink.append_chunk(&target, &chunk).await });
    }

    /// Queue a status update without waiting for it.
    ///
    /// Updates reach the sink in the order they were queued; a later update
    /// is not sent until the previous one has finished.
    pub fn dispatch_status(&self, update: StatusUpdate) {
        let status_tx = self
            .status_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let Some(status_tx) = status_tx else {
            warn!(status = ?update.status, "remote dispatcher already drained; status dropped");
            return;
        };
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = status_tx.send(update) {
            warn!(status = ?err.0.status, "remote status writer stopped; status dropped");
        }
    }

    fn spawn_write<F>(&self, what: String, write: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let failure_tx = self
            .failure_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let Some(failure_tx) = failure_tx else {
            warn!(what = %what, "remote dispatcher already drained; write dropped");
            return;
        };

        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.tracker.spawn(async move {
            if let Err(error) = write.await {
                let _ = failure_tx.send(SinkFailure { what, error });
            }
        });
    }

    /// Wait up to `timeout` for outstanding writes, then stop the supervisor.
    ///
    /// Writes dispatched after draining are dropped with a warning.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        // Closing the queue lets the status writer exit once it is empty.
        drop(
            self.status_tx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take(),
        );
        self.tracker.close();
        let deadline = tokio::time::Instant::now() + timeout;
        let completed = tokio::time::timeout_at(deadline, self.tracker.wait())
            .await
            .is_ok();

        // Dropping the last sender lets the supervisor finish once the
        // in-flight writes' clones are gone.
        drop(
            self.failure_tx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take(),
        );
        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = supervisor {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!("remote sink supervisor did not finish before deadline");
            }
        }

        let report = DrainReport {
            dispatched: self.dispatched.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            completed,
        };
        info!(
            dispatched = report.dispatched,
            failed = report.failed,
            completed = report.completed,
            "remote sink drained"
        );
        report
    }
}

/// Apply queued status updates one at a time, in order.
async fn write_statuses(
    sink: Arc<dyn RemoteSink>,
    target: StatusSinkSpec,
    mut updates: mpsc::UnboundedReceiver<StatusUpdate>,
    failure_tx: mpsc::UnboundedSender<SinkFailure>,
) {
    while let Some(update) = updates.recv().await {
        if let Err(error) = sink.update_status(&target, &update).await {
            let _ = failure_tx.send(SinkFailure {
                what: format!("status {:?}", update.status),
                error,
            });
        }
    }
}
