//! Live output transport for the submitting client.

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::event::EventEnvelope;

/// Best-effort channel to whoever submitted the job.
///
/// Sending never fails from the caller's point of view: once the client
/// has gone away, events are silently dropped.
#[derive(Debug, Clone)]
pub struct LiveTransport {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl LiveTransport {
    /// Create a transport and the receiving end handed to the client.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an envelope if the client is still listening.
    pub fn send(&self, envelope: EventEnvelope) {
        if self.tx.send(envelope).is_err() {
            debug!("live transport closed; event dropped");
        }
    }

    /// Whether the receiving side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
