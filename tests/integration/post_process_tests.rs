//! Auto-commit stage chain.

use session_worker::config::CommitConfig;
use session_worker::events::{EventSink, LiveTransport};
use session_worker::models::event::{CommitStage, Event, EventEnvelope};
use session_worker::orchestrator::post_process::{auto_commit, should_run};
use session_worker::summarize::Summarizer;

use super::test_helpers::{drain_events, FakeSummarizer, FakeVcs};

fn commit_config() -> CommitConfig {
    CommitConfig {
        fallback_message: "Apply agent changes".into(),
        ..CommitConfig::default()
    }
}

fn stages(events: &[EventEnvelope]) -> Vec<CommitStage> {
    events
        .iter()
        .filter_map(|e| match e.event {
            Event::CommitProgress { stage, .. } => Some(stage),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn dirty_workspace_emits_four_stages_ending_with_hash() {
    let temp = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::default();
    vcs.set_dirty(true);
    let summarizer = FakeSummarizer::replying("Add helper function\n");
    let (transport, mut rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, None);

    let hash = auto_commit(
        &vcs,
        Some(&summarizer as &dyn Summarizer),
        &commit_config(),
        temp.path(),
        &sink,
    )
    .await;

    assert_eq!(hash.as_deref(), Some("0123456789abcdef0123456789abcdef01234567"));
    let events = drain_events(&mut rx);
    assert_eq!(
        stages(&events),
        [
            CommitStage::Analyzing,
            CommitStage::GeneratingMessage,
            CommitStage::Committing,
            CommitStage::Completed,
        ]
    );
    match &events[3].event {
        Event::CommitProgress {
            commit_hash, error, ..
        } => {
            assert_eq!(commit_hash.as_deref(), hash.as_deref());
            assert!(error.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(*vcs.committed_messages.lock().unwrap(), ["Add helper function"]);

    let prompts = summarizer.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("src/lib.rs"));
}

#[tokio::test]
async fn clean_workspace_emits_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::default();
    let (transport, mut rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, None);

    let hash = auto_commit(&vcs, None, &commit_config(), temp.path(), &sink).await;

    assert!(hash.is_none());
    assert!(drain_events(&mut rx).is_empty());
    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn summarizer_failure_falls_back_to_configured_message() {
    let temp = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::default();
    vcs.set_dirty(true);
    let summarizer = FakeSummarizer::failing();
    let (transport, mut rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, None);

    let hash = auto_commit(
        &vcs,
        Some(&summarizer as &dyn Summarizer),
        &commit_config(),
        temp.path(),
        &sink,
    )
    .await;

    assert!(hash.is_some());
    assert_eq!(*vcs.committed_messages.lock().unwrap(), ["Apply agent changes"]);
    assert_eq!(stages(&drain_events(&mut rx)).len(), 4);
}

#[tokio::test]
async fn commit_failure_ends_chain_with_error_payload() {
    let temp = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::default();
    vcs.set_dirty(true);
    *vcs.commit_fails.lock().unwrap() = true;
    let (transport, mut rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, None);

    let hash = auto_commit(&vcs, None, &commit_config(), temp.path(), &sink).await;

    assert!(hash.is_none());
    let events = drain_events(&mut rx);
    assert_eq!(
        stages(&events),
        [
            CommitStage::Analyzing,
            CommitStage::GeneratingMessage,
            CommitStage::Committing,
            CommitStage::Completed,
        ]
    );
    match &events.last().unwrap().event {
        Event::CommitProgress {
            commit_hash, error, ..
        } => {
            assert!(commit_hash.is_none());
            assert!(error.as_deref().unwrap().contains("nothing added to commit"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn chain_requires_repository_and_request_flag() {
    assert!(should_run(true, true));
    assert!(!should_run(true, false));
    assert!(!should_run(false, true));
    assert!(!should_run(false, false));
}
