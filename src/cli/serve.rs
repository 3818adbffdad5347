// src/cli/serve.rs — `harmony-agent serve`: wire runtime, tracker and router

use std::sync::Arc;
use std::time::Duration;

use crate::api::{self, ApiState};
use crate::core::TaskSupervisor;
use crate::infra::config::Config;
use crate::runtime::gemini::GeminiRuntime;
use crate::runtime::tools::ToolRegistry;
use crate::tracking::TrackingClient;

/// Build the supervisor from config. The returned client is shared with the
/// supervisor so the caller can close it on shutdown.
pub fn build_supervisor(config: &Config) -> anyhow::Result<(TaskSupervisor, Arc<TrackingClient>)> {
    let tracker = Arc::new(TrackingClient::new(
        config.tracking.clone(),
        config.agent.model.clone(),
    )?);
    if !config.tracking.enabled() {
        tracing::warn!("HARMONY_API_URL not set; tasks will run untracked");
    }
    if config.agent.google_api_key.is_none() {
        tracing::warn!("No Google API key configured; agent runs will fail");
    }

    let runtime = Arc::new(GeminiRuntime::new(&config.agent, ToolRegistry::builtin()));
    let supervisor = TaskSupervisor::new(runtime, tracker.clone()).with_heartbeat_drain(
        Duration::from_secs(config.tracking.heartbeat_drain_secs),
    );
    Ok((supervisor, tracker))
}

pub async fn run_serve(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let (supervisor, tracker) = build_supervisor(&config)?;
    tracing::info!(
        agent = supervisor.root_agent(),
        model = %config.agent.model,
        worker = %config.tracking.worker_id,
        "Starting agent server"
    );

    let result = api::start_server(
        &config.server,
        ApiState {
            supervisor: supervisor.clone(),
        },
    )
    .await;

    // Tasks dropped during shutdown end their sessions in the background
    let grace = Duration::from_secs(config.tracking.timeout_secs + 1);
    supervisor.wait_for_session_ends(grace).await;
    tracker.close();
    result
}
