//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name used for credential lookups.
const KEYRING_SERVICE: &str = "session-worker";

/// Host CLI settings for the agent execution capability.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Host CLI binary (e.g., `claude`).
    pub host_cli: String,
    /// Arguments passed to the host CLI before the prompt.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Flag used to pass the agent's own session handle on resume.
    #[serde(default = "default_resume_flag")]
    pub resume_flag: String,
    /// Provider name → environment variable receiving the provider credential.
    #[serde(default = "default_credential_env")]
    pub credential_env: HashMap<String, String>,
    /// Hard limit on one execution; 0 means no limit.
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl AgentConfig {
    /// Execution time limit, if one is configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

fn default_resume_flag() -> String {
    "--resume".into()
}

fn default_credential_env() -> HashMap<String, String> {
    HashMap::from([("anthropic".to_owned(), "ANTHROPIC_API_KEY".to_owned())])
}

/// Repository handling settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryConfig {
    /// Git binary to invoke.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Hosts whose clone URLs receive the request's access token.
    #[serde(default = "default_token_hosts")]
    pub token_hosts: Vec<String>,
    /// Prefix for generated working branches.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Author name used for auto-commits.
    #[serde(default = "default_author_name")]
    pub author_name: String,
    /// Author email used for auto-commits.
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            git_binary: default_git_binary(),
            token_hosts: default_token_hosts(),
            branch_prefix: default_branch_prefix(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

fn default_git_binary() -> String {
    "git".into()
}

fn default_token_hosts() -> Vec<String> {
    vec!["github.com".into(), "gitlab.com".into()]
}

fn default_branch_prefix() -> String {
    "agent/".into()
}

fn default_author_name() -> String {
    "Session Worker".into()
}

fn default_author_email() -> String {
    "worker@localhost".into()
}

/// Auto-commit settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommitConfig {
    /// Message used when summarization is unavailable or fails.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Maximum characters of status+diff text handed to the summarizer.
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            max_diff_chars: default_max_diff_chars(),
        }
    }
}

fn default_fallback_message() -> String {
    "Apply changes from agent session".into()
}

fn default_max_diff_chars() -> usize {
    12_000
}

/// Summarization endpoint settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SummarizerConfig {
    /// Messages API endpoint.
    #[serde(default = "default_summarizer_endpoint")]
    pub endpoint: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens in the generated text.
    #[serde(default = "default_summarizer_max_tokens")]
    pub max_tokens: u32,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

fn default_summarizer_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".into()
}

fn default_summarizer_max_tokens() -> u32 {
    256
}

/// Remote event/status sink settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RemoteSinkConfig {
    /// Base URL of the sink service.
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_sink_timeout")]
    pub request_timeout_seconds: u64,
    /// Upper bound on draining outstanding writes before exit.
    #[serde(default = "default_drain_seconds")]
    pub drain_timeout_seconds: u64,
}

fn default_sink_timeout() -> u64 {
    10
}

fn default_drain_seconds() -> u64 {
    15
}

fn default_http_port() -> u16 {
    8080
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Parent directory of all local session workspaces.
    pub workspace_root: PathBuf,
    /// Root of the filesystem-backed durable store.
    pub storage_root: PathBuf,
    /// Directory for per-session event logs; defaults to `<storage_root>/logs`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// HTTP port for job submission.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Agent execution settings.
    pub agent: AgentConfig,
    /// Repository handling settings.
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Auto-commit settings.
    #[serde(default)]
    pub commit: CommitConfig,
    /// Optional summarization capability.
    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,
    /// Optional remote durable sink.
    #[serde(default)]
    pub remote_sink: Option<RemoteSinkConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the summarizer API key from OS keychain with env-var fallback.
    ///
    /// A missing key disables summarization instead of failing startup;
    /// commit messages and session names then use their fallbacks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        let Some(summarizer) = self.summarizer.as_mut() else {
            return Ok(());
        };
        match load_credential("summarizer_api_key", "SUMMARIZER_API_KEY").await? {
            Some(key) => summarizer.api_key = key,
            None => {
                warn!("no summarizer api key found; summarization disabled");
                self.summarizer = None;
            }
        }
        Ok(())
    }

    /// Directory holding per-session event logs.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.storage_root.join("logs"))
    }

    fn validate(&mut self) -> Result<()> {
        if self.agent.host_cli.trim().is_empty() {
            return Err(AppError::Config("agent.host_cli must not be empty".into()));
        }

        if self.repository.git_binary.trim().is_empty() {
            return Err(AppError::Config(
                "repository.git_binary must not be empty".into(),
            ));
        }

        if self.commit.fallback_message.trim().is_empty() {
            return Err(AppError::Config(
                "commit.fallback_message must not be empty".into(),
            ));
        }

        if let Some(ref sink) = self.remote_sink {
            if sink.base_url.trim().is_empty() {
                return Err(AppError::Config(
                    "remote_sink.base_url must not be empty".into(),
                ));
            }
        }

        self.workspace_root = ensure_dir(&self.workspace_root, "workspace_root")?;
        self.storage_root = ensure_dir(&self.storage_root, "storage_root")?;

        Ok(())
    }
}

/// Create `path` if needed and return its canonical form.
fn ensure_dir(path: &Path, field: &str) -> Result<PathBuf> {
    fs::create_dir_all(path)
        .map_err(|err| AppError::Config(format!("{field} cannot be created: {err}")))?;
    path.canonicalize()
        .map_err(|err| AppError::Config(format!("{field} invalid: {err}")))
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}
