//! Event fan-out: ordering, observer isolation, and remote draining.

use std::sync::Arc;
use std::time::Duration;

use session_worker::events::{EventLog, EventSink, LiveTransport, RemoteDispatcher};
use session_worker::models::event::{Event, EventEnvelope, JobStatus, StatusUpdate};
use session_worker::models::job::{Secret, StatusSinkSpec};

use super::test_helpers::{drain_events, RecordingRemoteSink};

fn target() -> StatusSinkSpec {
    StatusSinkSpec {
        id: "sink-1".into(),
        token: Secret::new("sink-token"),
    }
}

#[tokio::test]
async fn sequence_numbers_strictly_increase_even_when_remote_writes_fail() {
    let remote = Arc::new(RecordingRemoteSink::flaky());
    let dispatcher = RemoteDispatcher::new(remote.clone(), target());
    let (transport, mut rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, Some(dispatcher));

    for i in 0..10 {
        sink.emit(Event::progress(format!("step {i}")));
    }
    let report = sink
        .drain(Duration::from_secs(5))
        .await
        .expect("remote attached");

    assert_eq!(report.dispatched, 10);
    assert_eq!(report.failed, 5, "every other chunk write fails");
    assert!(report.completed);

    let delivered = drain_events(&mut rx);
    let sequences: Vec<u64> = delivered.iter().map(|e| e.sequence.unwrap()).collect();
    assert_eq!(sequences, (0..10).collect::<Vec<_>>());

    let indexes = remote.chunk_indexes();
    assert_eq!(indexes.len(), 5);
    assert!(indexes.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn closed_transport_does_not_stop_other_observers() {
    let temp = tempfile::tempdir().unwrap();
    let remote = Arc::new(RecordingRemoteSink::default());
    let (transport, rx) = LiveTransport::channel();
    drop(rx);
    assert!(transport.is_closed());

    let sink = EventSink::new(transport, Some(RemoteDispatcher::new(remote.clone(), target())));
    let log = EventLog::open(temp.path(), "abc").unwrap();
    let log_path = log.path().to_path_buf();
    sink.attach_log(log);

    sink.emit(Event::progress("one"));
    sink.emit(Event::progress("two"));
    sink.drain(Duration::from_secs(5)).await;

    let lines = std::fs::read_to_string(log_path).unwrap();
    assert_eq!(lines.lines().count(), 2);
    assert_eq!(remote.chunk_indexes(), vec![0, 1]);
}

#[tokio::test]
async fn status_updates_reach_remote_sink_before_drain_returns() {
    let remote = Arc::new(RecordingRemoteSink::default());
    let (transport, _rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, Some(RemoteDispatcher::new(remote.clone(), target())));

    sink.update_status(StatusUpdate {
        status: JobStatus::Running,
        session_id: Some("s1".into()),
        started_at: chrono::Utc::now(),
        finished_at: None,
        error_code: None,
    });
    sink.drain(Duration::from_secs(5)).await;

    let statuses = remote.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].status, JobStatus::Running);
}

fn status(status: JobStatus) -> StatusUpdate {
    StatusUpdate {
        status,
        session_id: Some("s1".into()),
        started_at: chrono::Utc::now(),
        finished_at: None,
        error_code: None,
    }
}

#[tokio::test]
async fn slow_running_status_cannot_overtake_terminal_status() {
    let remote = Arc::new(RecordingRemoteSink::slow_on(
        JobStatus::Running,
        Duration::from_millis(200),
    ));
    let (transport, _rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, Some(RemoteDispatcher::new(remote.clone(), target())));

    sink.update_status(status(JobStatus::Running));
    sink.emit(Event::progress("working"));
    sink.update_status(status(JobStatus::Completed));
    let report = sink.drain(Duration::from_secs(5)).await.unwrap();

    assert!(report.completed);
    assert_eq!(report.dispatched, 3);
    assert_eq!(remote.status_order(), [JobStatus::Running, JobStatus::Completed]);
    assert_eq!(remote.chunk_indexes(), [0], "chunks are not held behind statuses");
}

#[tokio::test]
async fn status_queued_after_drain_is_dropped() {
    let remote = Arc::new(RecordingRemoteSink::default());
    let (transport, _rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, Some(RemoteDispatcher::new(remote.clone(), target())));

    sink.drain(Duration::from_secs(5)).await;
    sink.update_status(status(JobStatus::Failed));
    tokio::task::yield_now().await;

    assert!(remote.status_order().is_empty());
}

#[tokio::test]
async fn sink_without_remote_reports_no_drain() {
    let (transport, _rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, None);
    assert!(!sink.has_remote());
    assert!(sink.drain(Duration::from_millis(10)).await.is_none());
}

#[test]
fn envelope_serializes_with_type_payload_and_sequence() {
    let mut envelope = EventEnvelope::now(Event::SessionNamed {
        name: "Fix login".into(),
    });
    envelope.sequence = Some(3);
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["type"], "session_named");
    assert_eq!(value["payload"]["name"], "Fix login");
    assert_eq!(value["sequence"], 3);
    assert!(value["timestamp"].is_string());
}

#[tokio::test]
async fn reopened_log_continues_numbering() {
    let temp = tempfile::tempdir().unwrap();

    let (transport, _rx) = LiveTransport::channel();
    let first = EventSink::new(transport, None);
    first.attach_log(EventLog::open(temp.path(), "abc").unwrap());
    for i in 0..3 {
        first.emit(Event::progress(format!("first {i}")));
    }
    drop(first);

    let log = EventLog::open(temp.path(), "abc").unwrap();
    assert_eq!(log.next_sequence(), 3);
    let log_path = log.path().to_path_buf();

    let (transport, mut rx) = LiveTransport::channel();
    let second = EventSink::new(transport, None);
    second.attach_log(log);
    second.emit(Event::progress("second"));

    assert_eq!(drain_events(&mut rx)[0].sequence, Some(3));
    let logged: Vec<u64> = std::fs::read_to_string(log_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<EventEnvelope>(line).unwrap().sequence.unwrap())
        .collect();
    assert_eq!(logged, [0, 1, 2, 3]);
}

#[test]
fn torn_log_line_is_skipped_when_scanning() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(
        temp.path().join("abc.jsonl"),
        "{\"timestamp\":\"2026-01-01T00:00:00Z\",\"sequence\":7,\"type\":\"progress\",\"payload\":{\"message\":\"x\"}}\n{\"timestamp\":\"2026-01-",
    )
    .unwrap();
    let log = EventLog::open(temp.path(), "abc").unwrap();
    assert_eq!(log.next_sequence(), 8);
}

#[test]
fn resume_sequence_never_moves_backwards() {
    let (transport, mut rx) = LiveTransport::channel();
    let sink = EventSink::new(transport, None);
    sink.resume_sequence(5);
    sink.resume_sequence(2);
    assert_eq!(sink.next_sequence(), 5);
    sink.emit(Event::progress("x"));
    assert_eq!(sink.next_sequence(), 6);
    assert_eq!(drain_events(&mut rx)[0].sequence, Some(5));
}
