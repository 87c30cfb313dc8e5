//! Fan-out of job events to independently failing observers.
//!
//! [`EventSink::emit`] assigns the next sequence number synchronously and
//! then delivers the envelope to:
//!
//! 1. the [`LiveTransport`] (best-effort, never fails),
//! 2. the session's [`EventLog`] once attached (synchronous; errors are
//!    logged and swallowed),
//! 3. the [`RemoteDispatcher`] when a remote sink is configured
//!    (fire-and-forget).
//!
//! A failure in one observer never prevents delivery to the others or
//! delays the next event.
//!
//! Sequence numbers are per session, not per job: a resumed session picks
//! up after the highest number in its event log or stored metadata.

pub mod log;
pub mod remote;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::warn;

use crate::models::event::{Event, EventChunk, EventEnvelope, StatusUpdate};

pub use self::log::EventLog;
pub use remote::{DrainReport, HttpRemoteSink, RemoteDispatcher, RemoteSink};
pub use transport::LiveTransport;

/// Per-job event distributor.
pub struct EventSink {
    transport: LiveTransport,
    log: Mutex<Option<EventLog>>,
    remote: Option<RemoteDispatcher>,
    next_sequence: AtomicU64,
}

impl EventSink {
    /// Create a sink delivering to `transport` and, optionally, a remote sink.
    #[must_use]
    pub fn new(transport: LiveTransport, remote: Option<RemoteDispatcher>) -> Self {
        Self {
            transport,
            log: Mutex::new(None),
            remote,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Start appending to `log`; earlier events are not replayed.
    ///
    /// Sequence numbering moves past anything the log already holds.
    pub fn attach_log(&self, log: EventLog) {
        self.resume_sequence(log.next_sequence());
        *self.log.lock().unwrap_or_else(PoisonError::into_inner) = Some(log);
    }

    /// Ensure the next emitted sequence is at least `next`. Never moves
    /// numbering backwards.
    pub fn resume_sequence(&self, next: u64) {
        self.next_sequence.fetch_max(next, Ordering::SeqCst);
    }

    /// Sequence the next emitted event will carry.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Distribute one event and return the envelope that was delivered.
    pub fn emit(&self, event: Event) -> EventEnvelope {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let mut envelope = EventEnvelope::now(event);
        envelope.sequence = Some(sequence);

        self.transport.send(envelope.clone());

        if let Some(log) = self
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            if let Err(err) = log.append(&envelope) {
                warn!(%err, sequence, kind = envelope.event.kind(), "event log append failed");
            }
        }

        if let Some(ref remote) = self.remote {
            remote.dispatch_chunk(EventChunk::from_envelope(sequence, &envelope));
        }

        envelope
    }

    /// Forward a status update to the remote sink, if any.
    pub fn update_status(&self, update: StatusUpdate) {
        if let Some(ref remote) = self.remote {
            remote.dispatch_status(update);
        }
    }

    /// Whether a remote sink is attached.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Give outstanding remote writes up to `timeout` to finish.
    pub async fn drain(&self, timeout: Duration) -> Option<DrainReport> {
        match self.remote {
            Some(ref remote) => Some(remote.drain(timeout).await),
            None => None,
        }
    }
}
