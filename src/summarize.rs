//! Short-text summarization used for session names and commit messages.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::{AppError, Result};

/// Messages API version header value.
const API_VERSION: &str = "2023-06-01";

/// Longest session name kept, in characters.
const MAX_NAME_CHARS: usize = 60;

/// Words taken from the request when no summarizer is available.
const FALLBACK_NAME_WORDS: usize = 6;

/// Single-turn text generation.
pub trait Summarizer: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Summarize` on any failure.
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// [`Summarizer`] backed by a messages-style HTTP API.
#[derive(Debug, Clone)]
pub struct MessagesApiSummarizer {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesApiSummarizer {
    /// Build a client from the `[summarizer]` section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the API key is missing or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::Config("summarizer api key is not set".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone(),
        })
    }
}

impl Summarizer for MessagesApiSummarizer {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let body = json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            });

            let response = self
                .client
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|err| AppError::Summarize(format!("request failed: {err}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Summarize(format!("endpoint returned {status}")));
            }

            let parsed: MessagesResponse = response
                .json()
                .await
                .map_err(|err| AppError::Summarize(format!("invalid response: {err}")))?;

            let text = parsed
                .content
                .into_iter()
                .find(|block| block.kind == "text")
                .and_then(|block| block.text)
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::Summarize("response carried no text".into()))?;
            debug!(chars = text.len(), "summary generated");
            Ok(text)
        })
    }
}

/// Prompt asking for a short session title.
#[must_use]
pub fn session_name_prompt(user_request: &str) -> String {
    format!(
        "Write a short title (at most six words) for a coding session that starts with \
         the request below. Reply with the title only, no quotes or punctuation at the end.\n\n\
         Request:\n{user_request}"
    )
}

/// Prompt asking for a commit message describing `status` and `diff`.
///
/// The diff is cut to `max_diff_chars` characters.
#[must_use]
pub fn commit_message_prompt(status: &str, diff: &str, max_diff_chars: usize) -> String {
    let diff = truncate_chars(diff, max_diff_chars);
    format!(
        "Write a git commit message for the changes below. Use a summary line of at most \
         72 characters, optionally followed by a blank line and a short body. Reply with \
         the message only.\n\nStatus:\n{status}\n\nDiff:\n{diff}"
    )
}

/// Normalize generated title text into a single line.
#[must_use]
pub fn clean_session_name(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let trimmed = line
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim_end_matches('.')
        .trim();
    truncate_chars(trimmed, MAX_NAME_CHARS).trim_end().to_owned()
}

/// Session name derived from the first words of the request.
#[must_use]
pub fn fallback_session_name(user_request: &str) -> String {
    let words: Vec<&str> = user_request
        .split_whitespace()
        .take(FALLBACK_NAME_WORDS)
        .collect();
    if words.is_empty() {
        return "Untitled session".to_owned();
    }
    truncate_chars(&words.join(" "), MAX_NAME_CHARS).to_owned()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
