//! Session and branch naming.

use futures_util::future::BoxFuture;

use session_worker::orchestrator::naming::{branch_name, generate_session_name, slugify};
use session_worker::summarize::{
    clean_session_name, commit_message_prompt, fallback_session_name, Summarizer,
};
use session_worker::{AppError, Result};

struct Canned(Option<&'static str>);

impl Summarizer for Canned {
    fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.0
                .map(str::to_owned)
                .ok_or_else(|| AppError::Summarize("unavailable".into()))
        })
    }
}

#[test]
fn slugify_collapses_separators_and_lowercases() {
    assert_eq!(slugify("Fix the Login Bug!"), "fix-the-login-bug");
    assert_eq!(slugify("  --Hello,   World--  "), "hello-world");
    assert_eq!(slugify("Ünïcode only ✓"), "n-code-only");
    assert_eq!(slugify("!!!"), "");
}

#[test]
fn slug_is_bounded_without_trailing_dash() {
    let slug = slugify(&"word ".repeat(20));
    assert!(slug.len() <= 40);
    assert!(!slug.ends_with('-'));
}

#[test]
fn branch_name_combines_prefix_slug_and_short_id() {
    assert_eq!(
        branch_name("agent/", "Fix login", "6d1f2a3b-0000-4000-8000-000000000001"),
        "agent/fix-login-6d1f2a3b"
    );
    assert_eq!(
        branch_name("agent/", "???", "6d1f-2a3b-ffff"),
        "agent/6d1f2a3b"
    );
}

#[test]
fn cleaned_names_are_single_line_without_quotes() {
    assert_eq!(clean_session_name("\"Fix login flow.\"\nextra"), "Fix login flow");
    assert_eq!(clean_session_name("\n\n  `Add docs`  "), "Add docs");
    assert!(clean_session_name(&"x".repeat(200)).chars().count() <= 60);
}

#[test]
fn fallback_name_uses_first_words() {
    assert_eq!(
        fallback_session_name("Please fix the flaky integration test in CI today"),
        "Please fix the flaky integration test"
    );
    assert_eq!(fallback_session_name("   "), "Untitled session");
}

#[test]
fn commit_prompt_truncates_diff() {
    let diff = "x".repeat(100);
    let prompt = commit_message_prompt(" M a.rs", &diff, 10);
    assert!(prompt.contains(" M a.rs"));
    assert!(prompt.contains(&"x".repeat(10)));
    assert!(!prompt.contains(&"x".repeat(11)));
}

#[tokio::test]
async fn generated_name_prefers_summarizer() {
    let summarizer = Canned(Some("Fix login\n"));
    let name = generate_session_name(Some(&summarizer as &dyn Summarizer), "please fix").await;
    assert_eq!(name, "Fix login");
}

#[tokio::test]
async fn generated_name_falls_back_on_failure_or_blank_reply() {
    let request = "Add README section";

    let failing = Canned(None);
    let name = generate_session_name(Some(&failing as &dyn Summarizer), request).await;
    assert_eq!(name, request);

    let blank = Canned(Some("  \n"));
    let name = generate_session_name(Some(&blank as &dyn Summarizer), request).await;
    assert_eq!(name, request);

    assert_eq!(generate_session_name(None, request).await, request);
}
