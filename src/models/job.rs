//! Job request model accepted by the submission endpoint.

use std::fmt::{Debug, Formatter};

use serde::Deserialize;
use serde_json::{Map, Value};

/// Opaque credential string that never appears in `Debug` output.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a raw credential.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw credential value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Repository to clone (or pull) into a new session's workspace.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RepositorySpec {
    /// Clone URL.
    pub url: String,
    /// Branch to check out; the remote default when absent.
    #[serde(default)]
    pub branch: Option<String>,
    /// Relative directory under the session root; derived from the URL when absent.
    #[serde(default)]
    pub directory: Option<String>,
    /// Access token injected into the URL for known hosts.
    #[serde(default)]
    pub access_token: Option<Secret>,
}

/// Reference to a remote durable status/event sink.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatusSinkSpec {
    /// Sink-side identifier for this job's record.
    pub id: String,
    /// Bearer token authorizing writes to the record.
    pub token: Secret,
}

/// One coding-assistant job.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct JobRequest {
    /// The user's request text handed to the agent.
    #[serde(default)]
    pub user_request: String,
    /// Provider identifier (e.g., `anthropic`).
    #[serde(default)]
    pub provider: String,
    /// Provider credentials.
    #[serde(default)]
    pub credentials: Secret,
    /// Existing session to resume.
    #[serde(default)]
    pub resume_session_id: Option<String>,
    /// Repository to materialize into a new session.
    #[serde(default)]
    pub repository: Option<RepositorySpec>,
    /// Whether to commit resulting changes; defaults to on when a repository is used.
    #[serde(default)]
    pub auto_commit: Option<bool>,
    /// Optional remote durable sink.
    #[serde(default)]
    pub status_sink: Option<StatusSinkSpec>,
    /// Provider options forwarded to the agent.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl JobRequest {
    /// Construct a request with the three mandatory fields.
    #[must_use]
    pub fn new(
        user_request: impl Into<String>,
        provider: impl Into<String>,
        credentials: impl Into<String>,
    ) -> Self {
        Self {
            user_request: user_request.into(),
            provider: provider.into(),
            credentials: Secret::new(credentials),
            ..Self::default()
        }
    }

    /// Whether auto-commit is requested, ignoring whether a repository was used.
    #[must_use]
    pub fn auto_commit_requested(&self) -> bool {
        self.auto_commit != Some(false)
    }
}
