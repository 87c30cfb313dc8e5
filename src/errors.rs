//! Error types shared across the application.
//!
//! Every failure carries its classification from the point where it is
//! raised. [`AppError::code`] maps a variant onto the [`ErrorCode`]
//! reported to observers in the terminal `error` event.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Classified error code reported to job observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or mutually exclusive request fields.
    InvalidRequest,
    /// The session requested for resume does not exist.
    SessionNotFound,
    /// The resumed session's files are missing and could not be rebuilt.
    WorkspaceRecoveryFailed,
    /// Credentials were rejected by a collaborator.
    AuthError,
    /// The requested repository does not exist or is not visible.
    RepoNotFound,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::WorkspaceRecoveryFailed => "WORKSPACE_RECOVERY_FAILED",
            Self::AuthError => "AUTH_ERROR",
            Self::RepoNotFound => "REPO_NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Request failed validation before any side effect.
    InvalidRequest(String),
    /// Resume target has no persisted metadata.
    SessionNotFound(String),
    /// Resume target's workspace is missing and could not be rebuilt.
    WorkspaceRecoveryFailed(String),
    /// A collaborator rejected the supplied credentials.
    Auth(String),
    /// Repository does not exist or is not accessible.
    RepoNotFound(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// Durable storage failure.
    Storage(String),
    /// Version-control operation failure.
    Vcs(String),
    /// Agent execution failure.
    Execution(String),
    /// Summarization capability failure.
    Summarize(String),
    /// Remote event or status sink failure.
    Sink(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Unclassified internal failure.
    Internal(String),
}

impl AppError {
    /// Classified code reported to observers for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::WorkspaceRecoveryFailed(_) => ErrorCode::WorkspaceRecoveryFailed,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::RepoNotFound(_) => ErrorCode::RepoNotFound,
            Self::Config(_)
            | Self::Storage(_)
            | Self::Vcs(_)
            | Self::Execution(_)
            | Self::Summarize(_)
            | Self::Sink(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::WorkspaceRecoveryFailed(msg) => write!(f, "workspace recovery failed: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::RepoNotFound(msg) => write!(f, "repo not found: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::Vcs(msg) => write!(f, "vcs: {msg}"),
            Self::Execution(msg) => write!(f, "execution: {msg}"),
            Self::Summarize(msg) => write!(f, "summarize: {msg}"),
            Self::Sink(msg) => write!(f, "sink: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Sink(err.to_string())
    }
}
