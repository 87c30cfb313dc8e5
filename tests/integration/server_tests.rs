//! HTTP surface: job submission, single-job gating, health and session admin.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use session_worker::models::session::SessionMetadata;
use session_worker::server::{router, GateState, ServerState};
use session_worker::storage::MetadataStore;

use super::test_helpers::{DepsBuilder, FakeAgent, TestEnv};

/// Serve `state` on an ephemeral loopback port.
async fn spawn_server(state: ServerState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

/// Event names in an SSE body, in order.
fn event_names(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(str::trim)
        .collect()
}

async fn health(client: &reqwest::Client, addr: SocketAddr) -> Value {
    client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_idle_before_any_job() {
    let env = TestEnv::new();
    let state = ServerState::new(DepsBuilder::new(&env).build(), CancellationToken::new());
    let addr = spawn_server(state).await;

    let body = health(&reqwest::Client::new(), addr).await;
    assert_eq!(body, json!({ "status": "idle" }));
}

#[tokio::test]
async fn submitted_job_streams_sse_and_signals_shutdown() {
    let env = TestEnv::new();
    let shutdown = CancellationToken::new();
    let state = ServerState::new(DepsBuilder::new(&env).build(), shutdown.clone());
    let gate = Arc::clone(state.gate());
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/jobs"))
        .json(&json!({
            "user_request": "Write a haiku",
            "provider": "anthropic",
            "credentials": "sk-test"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = response.text().await.unwrap();
    let names = event_names(&body);
    assert_eq!(names.first(), Some(&"connected"));
    assert_eq!(names.last(), Some(&"completed"));
    assert!(!names.contains(&"error"));

    tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled())
        .await
        .expect("shutdown signalled after the job");
    assert_eq!(gate.state(), GateState::Finished);
}

#[tokio::test]
async fn second_submission_is_rejected_while_busy_and_after() {
    let env = TestEnv::new();
    let mut builder = DepsBuilder::new(&env);
    builder.agent = Arc::new(FakeAgent::succeeding(vec![]).with_delay(Duration::from_millis(500)));
    let state = ServerState::new(builder.build(), CancellationToken::new());
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();
    let job = json!({
        "user_request": "Slow job",
        "provider": "anthropic",
        "credentials": "sk-test"
    });

    let first = client
        .post(format!("http://{addr}/jobs"))
        .json(&job)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(health(&client, addr).await["status"], "busy");

    let second = client
        .post(format!("http://{addr}/jobs"))
        .json(&job)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    first.text().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(health(&client, addr).await["status"], "finished");

    let third = client
        .post(format!("http://{addr}/jobs"))
        .json(&job)
        .send()
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_job_streams_single_error_event() {
    let env = TestEnv::new();
    let state = ServerState::new(DepsBuilder::new(&env).build(), CancellationToken::new());
    let addr = spawn_server(state).await;

    let body = reqwest::Client::new()
        .post(format!("http://{addr}/jobs"))
        .json(&json!({ "user_request": "", "provider": "anthropic", "credentials": "k" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(event_names(&body), ["error"]);
    assert!(body.contains("INVALID_REQUEST"));
    assert_eq!(env.workspace_entries(), 0);
}

#[tokio::test]
async fn session_admin_lists_and_deletes_stored_sessions() {
    let env = TestEnv::new();
    let builder = DepsBuilder::new(&env);
    let id = "6d1f2a3b-0000-4000-8000-0000000000aa";
    builder
        .metadata
        .save(&SessionMetadata::new(id.into(), "anthropic".into()))
        .await
        .unwrap();
    let state = ServerState::new(builder.build(), CancellationToken::new());
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let listed: Vec<String> = client
        .get(format!("http://{addr}/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, [id]);

    let deleted = client
        .delete(format!("http://{addr}/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert!(builder.metadata.load(id).await.unwrap().is_none());

    let missing = client
        .delete(format!("http://{addr}/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["code"], "SESSION_NOT_FOUND");

    let bad = client
        .delete(format!("http://{addr}/sessions/bad.id"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}
