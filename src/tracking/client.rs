// src/tracking/client.rs — HTTP client for the Harmony collector
//
// start is fail-fast (the caller decides to run untracked); heartbeat and end
// are fail-soft: errors are logged here and never cross this boundary.

use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;

use super::pricing::calculate_cost;
use super::types::{
    EndSessionRequest, HeartbeatRequest, StartSessionRequest, StartSessionResponse, UsageDelta,
};
use super::{SessionTracker, TrackingSession};
use crate::infra::config::TrackingConfig;
use crate::infra::errors::HarmonyError;

pub struct TrackingClient {
    config: TrackingConfig,
    model: String,
    /// `None` once closed.
    http: RwLock<Option<reqwest::Client>>,
}

impl TrackingClient {
    /// Build a client reporting `model` as the model version of every session.
    pub fn new(config: TrackingConfig, model: impl Into<String>) -> Result<Self, HarmonyError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| HarmonyError::Config(format!("Invalid collector API key: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("harmony-agent/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarmonyError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            model: model.into(),
            http: RwLock::new(Some(http)),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Release the HTTP transport. Later calls fail without touching the network.
    pub fn close(&self) {
        if let Ok(mut http) = self.http.write() {
            if http.take().is_some() {
                tracing::debug!("Tracking client closed");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.read().map(|h| h.is_none()).unwrap_or(true)
    }

    fn http(&self) -> Option<reqwest::Client> {
        self.http.read().ok().and_then(|h| h.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, String> {
        let http = self.http().ok_or_else(|| "client closed".to_string())?;
        let resp = http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {}s", self.config.timeout_secs)
                } else {
                    e.to_string()
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)));
        }
        Ok(resp)
    }

    /// Send a heartbeat, returning the failure instead of logging it.
    pub async fn post_heartbeat(
        &self,
        session: &TrackingSession,
        delta: UsageDelta,
    ) -> Result<(), HarmonyError> {
        let body = HeartbeatRequest {
            tokens_input: delta.tokens_input,
            tokens_output: delta.tokens_output,
            api_calls_count: delta.api_calls,
            cost_incurred: calculate_cost(&session.model, delta.tokens_input, delta.tokens_output),
            error_count: delta.error_count,
        };
        self.post(&format!("/api/sessions/{}/heartbeat", session.id), &body)
            .await
            .map(|_| ())
            .map_err(|e| HarmonyError::report_failed("heartbeat", e))
    }

    /// Send the terminal report, returning the failure instead of logging it.
    pub async fn post_end(
        &self,
        session: &TrackingSession,
        delta: UsageDelta,
    ) -> Result<(), HarmonyError> {
        let body = EndSessionRequest {
            tokens_input: delta.tokens_input,
            tokens_output: delta.tokens_output,
            cost_incurred: calculate_cost(&session.model, delta.tokens_input, delta.tokens_output),
            error_count: delta.error_count,
        };
        self.post(&format!("/api/sessions/{}/end", session.id), &body)
            .await
            .map(|_| ())
            .map_err(|e| HarmonyError::report_failed("end", e))
    }

    /// Run `fut` inside a tracking session: ended with one error if it fails,
    /// untracked if the session cannot be started.
    pub async fn track<F, T, E>(
        &self,
        task_id: &str,
        description: Option<&str>,
        fut: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send,
    {
        let session = match self.start_session(task_id, description).await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(task_id, "Running untracked: {e}");
                None
            }
        };

        let result = fut.await;

        if let Some(ref session) = session {
            let delta = UsageDelta {
                error_count: u32::from(result.is_err()),
                api_calls: 0,
                ..UsageDelta::default()
            };
            self.end_session(session, delta).await;
        }
        result
    }
}

#[async_trait]
impl SessionTracker for TrackingClient {
    async fn start_session(
        &self,
        task_id: &str,
        description: Option<&str>,
    ) -> Result<TrackingSession, HarmonyError> {
        if !self.config.enabled() {
            return Err(HarmonyError::unavailable("collector URL not configured"));
        }

        let body = StartSessionRequest {
            worker_id: self.config.worker_id.clone(),
            task_id: task_id.to_string(),
            task_description: description.map(str::to_string),
            model_version: self.model.clone(),
        };

        let resp = self
            .post("/api/sessions/start", &body)
            .await
            .map_err(HarmonyError::unavailable)?;
        let parsed: StartSessionResponse = resp
            .json()
            .await
            .map_err(|e| HarmonyError::unavailable(format!("Malformed start response: {e}")))?;

        tracing::info!(task_id, session_id = %parsed.session.id, "Tracking session started");
        Ok(TrackingSession {
            id: parsed.session.id,
            task_id: task_id.to_string(),
            model: self.model.clone(),
        })
    }

    async fn heartbeat(&self, session: &TrackingSession, delta: UsageDelta) {
        match self.post_heartbeat(session, delta).await {
            Ok(()) => tracing::debug!(
                session_id = %session.id,
                tokens_input = delta.tokens_input,
                tokens_output = delta.tokens_output,
                "Heartbeat reported"
            ),
            Err(e) => tracing::warn!(session_id = %session.id, "{e}"),
        }
    }

    async fn end_session(&self, session: &TrackingSession, delta: UsageDelta) {
        match self.post_end(session, delta).await {
            Ok(()) => tracing::info!(
                session_id = %session.id,
                error_count = delta.error_count,
                "Tracking session ended"
            ),
            // The remote session may stay open; operators need to see this.
            Err(e) => tracing::error!(session_id = %session.id, task_id = %session.task_id, "{e}"),
        }
    }
}

/// Truncate a string for logging.
fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
