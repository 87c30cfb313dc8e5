//! Bridge between an [`ExecutionCapability`] and the job's event sink.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

use super::{ExecutionCapability, ExecutionContext};
use crate::events::EventSink;
use crate::models::event::Event;
use crate::models::session::SessionMetadata;
use crate::storage::MetadataStore;
use crate::{AppError, Result};

/// Payloads buffered between the capability and the adapter.
const EVENT_BUFFER: usize = 256;

/// Capability session handle carried by an initialization payload:
/// `{"type": "system", "subtype": "init", "session_id": "…"}`.
#[must_use]
pub fn extract_correlation_id(payload: &Value) -> Option<&str> {
    let is_init = payload.get("type").and_then(Value::as_str) == Some("system")
        && payload.get("subtype").and_then(Value::as_str) == Some("init");
    if !is_init {
        return None;
    }
    payload
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Runs the capability and forwards its payloads.
pub struct ExecutionAdapter {
    capability: Arc<dyn ExecutionCapability>,
    timeout: Option<Duration>,
}

impl ExecutionAdapter {
    /// Wrap `capability`; `timeout` bounds the whole execution when set.
    #[must_use]
    pub fn new(capability: Arc<dyn ExecutionCapability>, timeout: Option<Duration>) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    /// Execute `user_request` and stream every payload to `sink` as an
    /// `execution` event.
    ///
    /// The first initialization payload seen during this run sets
    /// `metadata.external_correlation_id`, and the record is saved right
    /// away. A failed save is logged; the finalizer saves again.
    ///
    /// # Errors
    ///
    /// Propagates the capability's error unchanged, or
    /// `AppError::Execution` when the configured timeout expires.
    pub async fn run(
        &self,
        user_request: &str,
        ctx: &ExecutionContext,
        sink: &EventSink,
        metadata: &mut SessionMetadata,
        store: &dyn MetadataStore,
    ) -> Result<()> {
        let span = info_span!("execute", session_id = %ctx.session_id);
        async move {
            let (tx, mut rx) = mpsc::channel::<Value>(EVENT_BUFFER);
            let timeout = self.timeout;
            let execution = async {
                let run = self.capability.execute(user_request, ctx, tx);
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                        AppError::Execution(format!(
                            "execution timed out after {}s",
                            limit.as_secs()
                        ))
                    })?,
                    None => run.await,
                }
            };
            tokio::pin!(execution);

            let mut captured = false;
            let result = loop {
                tokio::select! {
                    biased;

                    Some(payload) = rx.recv() => {
                        self.forward(payload, sink, metadata, store, &mut captured).await;
                    }

                    result = &mut execution => break result,
                }
            };

            while let Ok(payload) = rx.try_recv() {
                self.forward(payload, sink, metadata, store, &mut captured)
                    .await;
            }

            match result {
                Ok(()) => info!("execution finished"),
                Err(ref err) => warn!(%err, "execution failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn forward(
        &self,
        payload: Value,
        sink: &EventSink,
        metadata: &mut SessionMetadata,
        store: &dyn MetadataStore,
        captured: &mut bool,
    ) {
        if !*captured {
            if let Some(id) = extract_correlation_id(&payload) {
                *captured = true;
                if metadata.external_correlation_id.as_deref() != Some(id) {
                    metadata.external_correlation_id = Some(id.to_owned());
                    metadata.touch();
                    info!(correlation_id = id, "captured agent session handle");
                    if let Err(err) = store.save(metadata).await {
                        warn!(%err, "failed to persist agent session handle");
                    }
                }
            }
        }
        sink.emit(Event::Execution(payload));
    }
}
