//! Clone URL handling: token injection and credential redaction.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

/// Return `url` with `token` embedded as credentials when its host matches
/// one of `token_hosts` (exact or subdomain match).
///
/// URLs that are not `http(s)`, already carry credentials, or point at an
/// unknown host are returned unchanged.
#[must_use]
pub fn authenticated_url(url: &str, token: Option<&str>, token_hosts: &[String]) -> String {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        return url.to_owned();
    };
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_owned();
    };
    if !matches!(parsed.scheme(), "http" | "https") || !parsed.username().is_empty() {
        return url.to_owned();
    }
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return url.to_owned();
    };
    let Some(matched) = token_hosts.iter().find(|pattern| host_matches(&host, pattern)) else {
        return url.to_owned();
    };

    let user = if matched.contains("gitlab") {
        "oauth2"
    } else {
        "x-access-token"
    };
    if parsed.set_username(user).is_err() || parsed.set_password(Some(token)).is_err() {
        return url.to_owned();
    }
    parsed.into()
}

fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    !pattern.is_empty() && (host == pattern || host.ends_with(&format!(".{pattern}")))
}

fn credential_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)([a-z][a-z0-9+.-]*://)[^/@\s]+@").ok())
        .as_ref()
}

/// Replace URL userinfo (`scheme://user:pass@`) in `text` with `***`.
#[must_use]
pub fn redact_credentials(text: &str) -> String {
    match credential_pattern() {
        Some(pattern) => pattern.replace_all(text, "${1}***@").into_owned(),
        None if text.contains('@') => "<redacted>".to_owned(),
        None => text.to_owned(),
    }
}
