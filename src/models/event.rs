//! Job event model.
//!
//! [`Event`] is a closed set of variants serialized adjacently tagged as
//! `{"type": …, "payload": …}`. [`EventEnvelope`] adds the timestamp and,
//! once assigned by the event sink, the per-session sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ErrorCode;

/// Auto-commit stage reported by `commit_progress` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    /// Computing status and diff.
    Analyzing,
    /// Asking the summarizer for a commit message.
    GeneratingMessage,
    /// Creating the commit.
    Committing,
    /// Stage chain finished (successfully or not).
    Completed,
}

/// One observable fact about a running job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// Session resolved; the job is live.
    Connected {
        /// Session identifier.
        session_id: String,
        /// Whether an existing session was resumed.
        resuming: bool,
    },
    /// Free-form pipeline progress.
    Progress {
        /// Human-readable message.
        message: String,
    },
    /// Clone/pull progress.
    RepositoryProgress {
        /// Human-readable message.
        message: String,
    },
    /// A session name was generated.
    SessionNamed {
        /// Generated name.
        name: String,
    },
    /// A working branch was created and checked out.
    BranchCreated {
        /// Branch name.
        branch: String,
    },
    /// Auto-commit stage transition.
    CommitProgress {
        /// Stage about to run (or `completed`).
        stage: CommitStage,
        /// Human-readable message.
        message: String,
        /// Hash of the created commit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        commit_hash: Option<String>,
        /// Non-critical failure description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Opaque payload forwarded from the execution capability.
    Execution(Value),
    /// Job finished successfully.
    Completed {
        /// Session identifier.
        session_id: String,
        /// Elapsed wall time.
        duration_ms: u64,
    },
    /// Job failed.
    Error {
        /// Classified error code.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
    },
}

impl Event {
    /// Shorthand for a progress event.
    #[must_use]
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
        }
    }

    /// Shorthand for a commit-progress event without hash or error.
    #[must_use]
    pub fn commit(stage: CommitStage, message: impl Into<String>) -> Self {
        Self::CommitProgress {
            stage,
            message: message.into(),
            commit_hash: None,
            error: None,
        }
    }

    /// Wire name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress { .. } => "progress",
            Self::RepositoryProgress { .. } => "repository_progress",
            Self::SessionNamed { .. } => "session_named",
            Self::BranchCreated { .. } => "branch_created",
            Self::CommitProgress { .. } => "commit_progress",
            Self::Execution(_) => "execution",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the job's stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }

    /// The variant's payload as a JSON value.
    #[must_use]
    pub fn payload(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// Timestamped event as delivered to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Per-session sequence number, assigned by the event sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// The event itself.
    #[serde(flatten)]
    pub event: Event,
}

impl EventEnvelope {
    /// Stamp `event` with the current time.
    #[must_use]
    pub fn now(event: Event) -> Self {
        Self {
            timestamp: Utc::now(),
            sequence: None,
            event,
        }
    }
}

/// Event addressed by index for the remote durable sink.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventChunk {
    /// Sequence index; the sink ignores duplicate indexes.
    pub index: u64,
    /// Event variant name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Variant payload.
    pub payload: Value,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

impl EventChunk {
    /// Build the chunk for `envelope` at `index`.
    #[must_use]
    pub fn from_envelope(index: u64, envelope: &EventEnvelope) -> Self {
        Self {
            index,
            kind: envelope.event.kind().to_owned(),
            payload: envelope.event.payload(),
            timestamp: envelope.timestamp,
        }
    }
}

/// Job status reported to the remote status sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Session resolved; the job is executing.
    Running,
    /// Job finished successfully.
    Completed,
    /// Job failed.
    Failed,
}

/// Status record written to the remote status sink.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusUpdate {
    /// Current status.
    pub status: JobStatus,
    /// Session the job is bound to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// When the job started.
    pub started_at: DateTime<Utc>,
    /// When the job finished, for terminal statuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error code, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}
