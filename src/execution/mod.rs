//! Agent execution.
//!
//! An [`ExecutionCapability`] runs one user request inside a workspace and
//! streams opaque JSON payloads back over a channel. The
//! [`ExecutionAdapter`] sits between the capability and the job's
//! [`EventSink`](crate::events::EventSink): it forwards every payload and
//! records the capability's own session handle the first time it appears.

pub mod adapter;
pub mod cli;
pub mod codec;

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::models::job::Secret;
use crate::Result;

pub use adapter::{extract_correlation_id, ExecutionAdapter};
pub use cli::CliAgent;

/// Everything a capability needs besides the request text.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// This system's session id.
    pub session_id: String,
    /// Provider identifier from the request.
    pub provider: String,
    /// Provider credentials.
    pub credentials: Secret,
    /// Directory the agent works in.
    pub workspace_path: PathBuf,
    /// The capability's own session handle from an earlier run, if known.
    pub external_correlation_id: Option<String>,
    /// Provider-specific options passed through from the request.
    pub options: Map<String, Value>,
}

/// External agent capability.
pub trait ExecutionCapability: Send + Sync {
    /// Run `user_request` to completion, sending each payload to `events`.
    ///
    /// Dropping the returned future must stop the underlying work.
    ///
    /// # Errors
    ///
    /// Any failure of the underlying agent; the adapter propagates it as-is.
    fn execute<'a>(
        &'a self,
        user_request: &'a str,
        ctx: &'a ExecutionContext,
        events: mpsc::Sender<Value>,
    ) -> BoxFuture<'a, Result<()>>;
}
