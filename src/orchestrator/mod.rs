//! Single-job pipeline.
//!
//! [`Orchestrator::run`] drives one job through session resolution,
//! workspace materialization, execution, optional auto-commit and
//! finalization. Each stage lives in its own module and reports through
//! the job's [`EventSink`](crate::events::EventSink).

pub mod finalizer;
pub mod job;
pub mod materializer;
pub mod naming;
pub mod post_process;
pub mod session_resolver;

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::events::RemoteSink;
use crate::execution::ExecutionCapability;
use crate::storage::{DurableStorage, MetadataStore};
use crate::summarize::Summarizer;
use crate::vcs::VersionControl;

pub use job::{JobState, Orchestrator, Termination};
pub use session_resolver::ResolvedSession;

/// Collaborators a job runs against.
#[derive(Clone)]
pub struct JobDeps {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Durable copy of session files.
    pub storage: Arc<dyn DurableStorage>,
    /// Session metadata records.
    pub metadata: Arc<dyn MetadataStore>,
    /// Repository operations.
    pub vcs: Arc<dyn VersionControl>,
    /// Agent capability.
    pub execution: Arc<dyn ExecutionCapability>,
    /// Summarizer for names and commit messages, when configured.
    pub summarizer: Option<Arc<dyn Summarizer>>,
    /// Remote event/status sink, when configured.
    pub remote_sink: Option<Arc<dyn RemoteSink>>,
}
