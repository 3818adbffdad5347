// tests/api_test.rs — Integration test: HTTP router with a canned runtime and no collector

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use harmony_agent::api::types::{HealthResponse, RunResponse};
use harmony_agent::api::{build_router, ApiState};
use harmony_agent::core::TaskSupervisor;
use harmony_agent::infra::config::TrackingConfig;
use harmony_agent::runtime::{AgentRuntime, EventStream, RuntimeError, StreamEvent};
use harmony_agent::tracking::TrackingClient;

/// Echoes the message back in two fragments; "explode" faults instead.
struct EchoRuntime;

#[async_trait]
impl AgentRuntime for EchoRuntime {
    fn root_agent(&self) -> &str {
        "harmony_agent"
    }

    async fn create_session(&self, _user_id: &str) -> Result<String, RuntimeError> {
        Ok("conv".into())
    }

    async fn run(
        &self,
        _user_id: &str,
        _session_id: &str,
        message: &str,
    ) -> Result<EventStream, RuntimeError> {
        let items = if message == "explode" {
            vec![Err(RuntimeError::provider("kaboom", false))]
        } else {
            vec![
                Ok(StreamEvent::text(format!("echo: {message}"))),
                Ok(StreamEvent::text("done").with_usage(3, 1)),
            ]
        };
        let events: EventStream = Box::pin(futures::stream::iter(items));
        Ok(events)
    }

    async fn close_session(&self, _session_id: &str) {}
}

fn router() -> axum::Router {
    // No collector URL: every task runs untracked
    let tracker = Arc::new(TrackingClient::new(TrackingConfig::default(), "gemini-2.5-flash").unwrap());
    let supervisor = TaskSupervisor::new(Arc::new(EchoRuntime), tracker);
    build_router(ApiState { supervisor })
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn run_request(task_id: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/run/{task_id}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let resp = router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = body_json(resp).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.agent, "harmony_agent");
}

#[tokio::test]
async fn test_run_task_collects_response() {
    let resp = router()
        .oneshot(run_request("task-1", serde_json::json!({ "text": "hello" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let run: RunResponse = body_json(resp).await;
    assert_eq!(
        run,
        RunResponse {
            task_id: "task-1".into(),
            response: "echo: hello\ndone".into(),
            errors: 0,
        }
    );
}

#[tokio::test]
async fn test_run_task_fault_is_in_body() {
    let resp = router()
        .oneshot(run_request("task-2", serde_json::json!({ "text": "explode" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let run: RunResponse = body_json(resp).await;
    assert_eq!(run.errors, 1);
    assert_eq!(run.response, "Error: Model provider error: kaboom");
}

#[tokio::test]
async fn test_run_task_empty_body_defaults_text() {
    let resp = router()
        .oneshot(run_request("task-3", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let run: RunResponse = body_json(resp).await;
    assert_eq!(run.response, "echo: \ndone");
}

#[tokio::test]
async fn test_ws_requires_upgrade() {
    let resp = router()
        .oneshot(Request::builder().uri("/ws/task-4").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(resp.status().is_client_error());
}
