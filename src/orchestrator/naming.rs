//! Session names and working branch names.

use tracing::{debug, warn};

use crate::summarize::{clean_session_name, fallback_session_name, session_name_prompt, Summarizer};

/// Longest slug kept in a branch name.
const MAX_SLUG_CHARS: usize = 40;

/// Characters of the session id appended to branch names.
const SHORT_ID_CHARS: usize = 8;

/// Human-readable session name for `user_request`.
///
/// Uses the summarizer when available and falls back to the first words of
/// the request when it is absent, fails or returns nothing usable.
pub async fn generate_session_name(
    summarizer: Option<&dyn Summarizer>,
    user_request: &str,
) -> String {
    if let Some(summarizer) = summarizer {
        match summarizer.generate(&session_name_prompt(user_request)).await {
            Ok(raw) => {
                let name = clean_session_name(&raw);
                if !name.is_empty() {
                    return name;
                }
                debug!("summarizer returned an empty session name");
            }
            Err(err) => warn!(%err, "session naming failed; using fallback"),
        }
    }
    fallback_session_name(user_request)
}

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else become `-`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Working branch for a new session: `<prefix><slug>-<short id>`.
///
/// The slug is omitted when the name has no usable characters.
#[must_use]
pub fn branch_name(prefix: &str, session_name: &str, session_id: &str) -> String {
    let short_id: String = session_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(SHORT_ID_CHARS)
        .collect();
    let slug = slugify(session_name);
    if slug.is_empty() {
        format!("{prefix}{short_id}")
    } else {
        format!("{prefix}{slug}-{short_id}")
    }
}
