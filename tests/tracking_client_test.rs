// tests/tracking_client_test.rs — Integration test: collector client against a mock collector

use std::time::Duration;

use harmony_agent::infra::config::TrackingConfig;
use harmony_agent::infra::errors::HarmonyError;
use harmony_agent::tracking::client::TrackingClient;
use harmony_agent::tracking::types::{EndSessionRequest, HeartbeatRequest};
use harmony_agent::tracking::{SessionTracker, TrackingSession, UsageDelta};
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(url: &str) -> TrackingConfig {
    TrackingConfig {
        worker_id: "worker-7".into(),
        api_key: "test-key".into(),
        api_url: url.into(),
        timeout_secs: 1,
        ..TrackingConfig::default()
    }
}

fn session(model: &str) -> TrackingSession {
    TrackingSession {
        id: "sess-1".into(),
        task_id: "task-1".into(),
        model: model.into(),
    }
}

async fn bodies(server: &MockServer, url_path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == url_path)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_start_session_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sessions/start"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "session": { "id": "sess-42", "worker_id": "worker-7", "status": "active" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    let session = client
        .start_session("task-9", Some("WebSocket session for task task-9"))
        .await
        .unwrap();

    assert_eq!(session.id, "sess-42");
    assert_eq!(session.task_id, "task-9");
    assert_eq!(session.model, "gemini-2.5-flash");

    let sent = bodies(&mock_server, "/api/sessions/start").await;
    assert_eq!(
        sent[0],
        serde_json::json!({
            "worker_id": "worker-7",
            "task_id": "task-9",
            "task_description": "WebSocket session for task task-9",
            "model_version": "gemini-2.5-flash"
        })
    );
}

#[tokio::test]
async fn test_start_session_omits_missing_description() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/start"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session": {"id": "s"}})),
        )
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gpt-4o").unwrap();
    client.start_session("t", None).await.unwrap();

    let sent = bodies(&mock_server, "/api/sessions/start").await;
    assert!(sent[0].get("task_description").is_none());
}

#[tokio::test]
async fn test_start_session_server_error_is_unavailable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/start"))
        .respond_with(ResponseTemplate::new(500).set_body_string("collector down"))
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    let err = client.start_session("t", None).await.unwrap_err();

    match err {
        HarmonyError::TrackingUnavailable { message } => {
            assert!(message.contains("500"), "got: {message}");
            assert!(message.contains("collector down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_start_session_malformed_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    let err = client.start_session("t", None).await.unwrap_err();
    assert!(matches!(err, HarmonyError::TrackingUnavailable { .. }));
}

#[tokio::test]
async fn test_start_session_without_url_makes_no_call() {
    let client = TrackingClient::new(config(""), "gemini-2.5-flash").unwrap();
    let err = client.start_session("t", None).await.unwrap_err();
    assert!(matches!(err, HarmonyError::TrackingUnavailable { .. }));
}

#[tokio::test]
async fn test_heartbeat_reports_priced_delta() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/heartbeat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    client
        .heartbeat(&session("gemini-2.5-flash"), UsageDelta::tokens(1_000_000, 1_000_000))
        .await;

    let sent = bodies(&mock_server, "/api/sessions/sess-1/heartbeat").await;
    let body: HeartbeatRequest = serde_json::from_value(sent[0].clone()).unwrap();
    assert_eq!(body.tokens_input, 1_000_000);
    assert_eq!(body.tokens_output, 1_000_000);
    assert_eq!(body.api_calls_count, 1);
    assert_eq!(body.error_count, 0);
    assert!((body.cost_incurred - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_heartbeat_unknown_model_costs_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/heartbeat"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "llama-3").unwrap();
    client
        .heartbeat(&session("llama-3"), UsageDelta::tokens(500, 500))
        .await;

    let sent = bodies(&mock_server, "/api/sessions/sess-1/heartbeat").await;
    assert_eq!(sent[0]["cost_incurred"], 0.0);
}

#[tokio::test]
async fn test_heartbeat_failure_is_swallowed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/heartbeat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    // Returns unit; the failure only surfaces through post_heartbeat
    client
        .heartbeat(&session("gemini-2.5-flash"), UsageDelta::tokens(1, 1))
        .await;

    let err = client
        .post_heartbeat(&session("gemini-2.5-flash"), UsageDelta::tokens(1, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarmonyError::TrackingReportFailed { ref endpoint, .. } if endpoint == "heartbeat"
    ));
}

#[tokio::test]
async fn test_heartbeat_timeout_is_bounded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/heartbeat"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    let started = std::time::Instant::now();
    let err = client
        .post_heartbeat(&session("gemini-2.5-flash"), UsageDelta::tokens(1, 1))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(err.to_string().contains("timed out"), "got: {err}");
}

#[tokio::test]
async fn test_end_session_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/end"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    client
        .end_session(
            &session("gemini-2.5-flash"),
            UsageDelta {
                error_count: 2,
                ..UsageDelta::default()
            },
        )
        .await;

    let sent = bodies(&mock_server, "/api/sessions/sess-1/end").await;
    let body: EndSessionRequest = serde_json::from_value(sent[0].clone()).unwrap();
    assert_eq!(
        body,
        EndSessionRequest {
            tokens_input: 0,
            tokens_output: 0,
            cost_incurred: 0.0,
            error_count: 2,
        }
    );
}

#[tokio::test]
async fn test_closed_client_reports_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    client.close();
    client.close();
    assert!(client.is_closed());

    client
        .heartbeat(&session("gemini-2.5-flash"), UsageDelta::tokens(1, 1))
        .await;
    client
        .end_session(&session("gemini-2.5-flash"), UsageDelta::default())
        .await;
    assert!(client.start_session("t", None).await.is_err());
}

#[tokio::test]
async fn test_track_ends_with_error_on_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/start"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"session": {"id": "sess-1"}})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/end"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    let result: Result<(), String> = client
        .track("t", None, async { Err("boom".to_string()) })
        .await;
    assert_eq!(result, Err("boom".to_string()));

    let sent = bodies(&mock_server, "/api/sessions/sess-1/end").await;
    assert_eq!(sent[0]["error_count"], 1);
}

#[tokio::test]
async fn test_track_runs_untracked_when_start_fails() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/start"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = TrackingClient::new(config(&mock_server.uri()), "gemini-2.5-flash").unwrap();
    let result: Result<u32, String> = client.track("t", None, async { Ok(7) }).await;
    assert_eq!(result, Ok(7));

    let requests = mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
}
