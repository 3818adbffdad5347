// src/tracking/mod.rs — Harmony session tracking

pub mod client;
pub mod pricing;
pub mod types;

use async_trait::async_trait;

use crate::infra::errors::HarmonyError;
pub use client::TrackingClient;
pub use pricing::calculate_cost;
pub use types::UsageDelta;

/// A session opened on the collector. Exists only after a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSession {
    /// Collector-assigned id.
    pub id: String,
    pub task_id: String,
    /// Model identifier used to price every report in this session.
    pub model: String,
}

/// Lifecycle operations against a tracking collector.
///
/// `start_session` fails fast; `heartbeat` and `end_session` are fail-soft and
/// never return an error to the caller.
#[async_trait]
pub trait SessionTracker: Send + Sync {
    async fn start_session(
        &self,
        task_id: &str,
        description: Option<&str>,
    ) -> Result<TrackingSession, HarmonyError>;

    /// Report an incremental delta.
    async fn heartbeat(&self, session: &TrackingSession, delta: UsageDelta);

    /// Close the session with a final delta. Called once per opened session.
    async fn end_session(&self, session: &TrackingSession, delta: UsageDelta);
}
